//! 8259 PIC 리매핑
//!
//! IRQ 0-15를 CPU 예외(0-31)와 겹치지 않도록 벡터 32-47로 옮깁니다.

use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// 리매핑된 인터럽트 벡터 오프셋
pub const PIC1_OFFSET: u8 = 32;
pub const PIC2_OFFSET: u8 = 40;

/// PIC 초기화 및 리매핑
///
/// 모든 라인은 마스크된 상태로 남습니다. 라인은 핸들러 등록 시 개별적으로 열립니다.
///
/// # Safety
/// 인터럽트가 비활성화된 상태에서 한 번만 호출되어야 합니다.
pub unsafe fn init() {
    let mut pic1_command: Port<u8> = Port::new(PIC1_COMMAND);
    let mut pic1_data: Port<u8> = Port::new(PIC1_DATA);
    let mut pic2_command: Port<u8> = Port::new(PIC2_COMMAND);
    let mut pic2_data: Port<u8> = Port::new(PIC2_DATA);

    // 0x80 포트 쓰기로 짧은 I/O 지연
    let mut wait_port: Port<u8> = Port::new(0x80);
    let mut wait = || wait_port.write(0);

    pic1_command.write(ICW1_INIT | ICW1_ICW4);
    wait();
    pic2_command.write(ICW1_INIT | ICW1_ICW4);
    wait();

    pic1_data.write(PIC1_OFFSET);
    wait();
    pic2_data.write(PIC2_OFFSET);
    wait();

    // 슬레이브는 마스터의 IRQ2에 연결
    pic1_data.write(4);
    wait();
    pic2_data.write(2);
    wait();

    pic1_data.write(ICW4_8086);
    wait();
    pic2_data.write(ICW4_8086);
    wait();

    pic1_data.write(0xFF);
    pic2_data.write(0xFF);
}

/// IRQ 라인 마스크 설정 (`enabled == true`면 마스크 해제)
///
/// # Safety
/// `init` 이후에 호출되어야 합니다.
pub unsafe fn set_mask(irq: u8, enabled: bool) {
    interrupts::without_interrupts(|| {
        let mut port: Port<u8> = if irq < 8 {
            Port::new(PIC1_DATA)
        } else {
            Port::new(PIC2_DATA)
        };

        let bit = 1 << (irq % 8);
        let mut mask = port.read();
        if enabled {
            mask &= !bit;
        } else {
            mask |= bit;
        }
        port.write(mask);

        // 슬레이브 라인은 캐스케이드(IRQ2)도 열려 있어야 함
        if irq >= 8 && enabled {
            let mut master: Port<u8> = Port::new(PIC1_DATA);
            let cascade = master.read() & !(1 << 2);
            master.write(cascade);
        }
    });
}

/// 인터럽트 종료 신호 전송
///
/// # Safety
/// 현재 처리 중인 IRQ에 대해서만 호출되어야 합니다.
pub unsafe fn end_of_interrupt(irq: u8) {
    if irq >= 8 {
        Port::<u8>::new(PIC2_COMMAND).write(EOI);
    }
    Port::<u8>::new(PIC1_COMMAND).write(EOI);
}
