//! PIT (Programmable Interval Timer) 드라이버
//!
//! 채널 0을 100Hz로 프로그래밍하고 틱 카운터를 유지합니다.
//! 상위 계층은 틱 훅 하나를 등록해 주기 작업을 수행합니다.

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use x86_64::instructions::port::Port;

/// PIT I/O 포트 주소
const PIT_CHANNEL0_DATA: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// PIT 기본 클럭 주파수 (Hz)
const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// 초당 틱 수
pub const TICKS_PER_SECOND: u32 = 100;

const MS_PER_TICK: u64 = 1000 / TICKS_PER_SECOND as u64;

/// 타이머 틱 카운터
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// 매 틱마다 호출되는 훅
static TICK_HOOK: Mutex<Option<fn()>> = Mutex::new(None);

/// 부팅 이후 틱 수
pub fn ticks() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// 부팅 이후 밀리초
pub fn milliseconds() -> u64 {
    ticks() * MS_PER_TICK
}

/// 틱 훅 등록 (이전 훅은 교체됨)
pub fn set_tick_hook(hook: fn()) {
    *TICK_HOOK.lock() = Some(hook);
}

/// PIT 초기화
///
/// # Safety
/// 한 번만, 인터럽트가 비활성화된 상태에서 호출되어야 합니다.
pub unsafe fn init() {
    let divisor = (PIT_BASE_FREQUENCY / TICKS_PER_SECOND) as u16;

    // Channel 0, lobyte/hibyte, Mode 3 (square wave), binary
    let mut command_port: Port<u8> = Port::new(PIT_COMMAND);
    command_port.write(0x36);

    let mut data_port: Port<u8> = Port::new(PIT_CHANNEL0_DATA);
    data_port.write((divisor & 0xFF) as u8);
    data_port.write((divisor >> 8) as u8);

    crate::log_info!("PIT initialized: {} Hz (divisor: {})", TICKS_PER_SECOND, divisor);
}

/// IRQ0 처리
///
/// 인터럽트 컨텍스트에서 실행됩니다. 훅 테이블이 잠겨 있으면 이번 틱의 훅은 건너뜁니다.
pub fn tick() {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);

    let hook = TICK_HOOK.try_lock().and_then(|slot| *slot);
    if let Some(hook) = hook {
        hook();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_hook() {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn tick_advances_clock_and_runs_hook() {
        set_tick_hook(counting_hook);
        let before_ticks = ticks();
        let before_calls = HOOK_CALLS.load(Ordering::SeqCst);
        tick();
        tick();
        assert!(ticks() >= before_ticks + 2);
        assert!(HOOK_CALLS.load(Ordering::SeqCst) >= before_calls + 2);
        assert_eq!(milliseconds() % MS_PER_TICK, 0);
    }
}
