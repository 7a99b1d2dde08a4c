//! IDT (Interrupt Descriptor Table) 설정
//!
//! 치명적 예외는 로그를 남기고 정지합니다.
//! 하드웨어 IRQ 벡터(32-47)는 모두 `irq::dispatch`로 전달됩니다.

use spin::Lazy;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use super::irq;
use super::pic::PIC1_OFFSET;
use crate::{log_error, log_warn};

macro_rules! irq_stub {
    ($name:ident, $line:expr) => {
        extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
            irq::dispatch($line);
        }
    };
}

irq_stub!(irq0, 0);
irq_stub!(irq1, 1);
irq_stub!(irq2, 2);
irq_stub!(irq3, 3);
irq_stub!(irq4, 4);
irq_stub!(irq5, 5);
irq_stub!(irq6, 6);
irq_stub!(irq7, 7);
irq_stub!(irq8, 8);
irq_stub!(irq9, 9);
irq_stub!(irq10, 10);
irq_stub!(irq11, 11);
irq_stub!(irq12, 12);
irq_stub!(irq13, 13);
irq_stub!(irq14, 14);
irq_stub!(irq15, 15);

const IRQ_STUBS: [extern "x86-interrupt" fn(InterruptStackFrame); irq::IRQ_LINES] = [
    irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13, irq14,
    irq15,
];

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();
    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.double_fault.set_handler_fn(double_fault_handler);
    idt.general_protection_fault
        .set_handler_fn(general_protection_fault_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);

    for (line, stub) in IRQ_STUBS.iter().enumerate() {
        idt[PIC1_OFFSET + line as u8].set_handler_fn(*stub);
    }
    idt
});

/// IDT 로드
pub fn init() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log_warn!("Breakpoint at {:#x}", stack_frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, _error_code: u64) -> ! {
    log_error!("Double Fault at {:#x}", stack_frame.instruction_pointer.as_u64());
    halt_forever()
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log_error!(
        "General Protection Fault at {:#x} (error code {:#x})",
        stack_frame.instruction_pointer.as_u64(),
        error_code
    );
    halt_forever()
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let address = x86_64::registers::control::Cr2::read_raw();
    log_error!(
        "Page Fault at {:#x} accessing {:#x} ({:?})",
        stack_frame.instruction_pointer.as_u64(),
        address,
        error_code
    );
    halt_forever()
}

fn halt_forever() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
