//! IRQ 라인 핸들러 테이블
//!
//! 16개 레거시 IRQ 라인마다 핸들러 슬롯 하나를 둡니다.
//! IDT 스텁은 라인 번호로 `dispatch`만 호출하고, 실제 처리는 여기 등록된 함수가 합니다.

use core::fmt;
use spin::Mutex;

/// 레거시 PIC IRQ 라인 수
pub const IRQ_LINES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// 0..16 범위 밖의 라인
    InvalidLine(u8),
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqError::InvalidLine(line) => write!(f, "invalid IRQ line {}", line),
        }
    }
}

static HANDLERS: Mutex<[Option<fn()>; IRQ_LINES]> = Mutex::new([None; IRQ_LINES]);

/// 핸들러 등록 (같은 라인의 기존 핸들러는 교체됨)
pub fn register_handler(line: u8, handler: fn()) -> Result<(), IrqError> {
    let slot = line as usize;
    if slot >= IRQ_LINES {
        return Err(IrqError::InvalidLine(line));
    }
    HANDLERS.lock()[slot] = Some(handler);
    set_line_enabled(line, true);

    crate::log_debug!("IRQ {} handler registered", line);
    Ok(())
}

/// 핸들러 해제
pub fn unregister_handler(line: u8) -> Result<(), IrqError> {
    let slot = line as usize;
    if slot >= IRQ_LINES {
        return Err(IrqError::InvalidLine(line));
    }
    HANDLERS.lock()[slot] = None;
    set_line_enabled(line, false);

    Ok(())
}

/// 라인에 등록된 핸들러 호출 후 EOI 전송
///
/// 인터럽트 컨텍스트에서 호출됩니다. 테이블이 잠겨 있으면 핸들러는 건너뛰고 EOI만 보냅니다.
pub fn dispatch(line: u8) {
    let handler = HANDLERS
        .try_lock()
        .and_then(|table| table.get(line as usize).copied().flatten());

    if let Some(handler) = handler {
        handler();
    }
    acknowledge(line);
}

#[cfg(target_os = "none")]
fn set_line_enabled(line: u8, enabled: bool) {
    // SAFETY: PIC는 IDT 로드 전에 리매핑됨
    unsafe { super::pic::set_mask(line, enabled) }
}

#[cfg(not(target_os = "none"))]
fn set_line_enabled(_line: u8, _enabled: bool) {}

#[cfg(target_os = "none")]
fn acknowledge(line: u8) {
    // SAFETY: 현재 처리 중인 라인에 대한 EOI
    unsafe { super::pic::end_of_interrupt(line) }
}

#[cfg(not(target_os = "none"))]
fn acknowledge(_line: u8) {}
