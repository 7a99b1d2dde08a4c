//! 시리얼 포트 드라이버
//!
//! UART 16550(COM1)을 로그 출력과 셸 콘솔로 사용합니다.

use core::fmt::{self, Write};
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::PortReadOnly;

const COM1_BASE: u16 = 0x3F8;
/// Line Status Register
const COM1_LSR: u16 = COM1_BASE + 5;
/// LSR: 수신 데이터 있음
const LSR_DATA_READY: u8 = 0x01;

/// COM1 시리얼 포트
pub static SERIAL1: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1_BASE) });

/// 시리얼 포트 초기화
///
/// 커널 초기화 시 한 번 호출되어야 합니다.
pub fn init() {
    SERIAL1.lock().init();
}

/// 수신된 바이트가 있으면 반환 (블로킹하지 않음)
pub fn try_read_byte() -> Option<u8> {
    let mut lsr: PortReadOnly<u8> = PortReadOnly::new(COM1_LSR);
    // SAFETY: COM1 LSR 읽기는 부작용이 없음
    let status = unsafe { lsr.read() };
    if status & LSR_DATA_READY == 0 {
        return None;
    }
    Some(interrupts::without_interrupts(|| SERIAL1.lock().receive()))
}

/// 셸 출력용 `fmt::Write` 구현체
pub struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        interrupts::without_interrupts(|| SERIAL1.lock().write_str(s))
    }
}

/// 시리얼 포트를 통한 출력 매크로
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

/// 시리얼 포트를 통한 출력 매크로 (줄바꿈 포함)
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // 타이머 틱 안에서 로그를 찍어도 교착되지 않도록 인터럽트를 막고 출력
    interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}
