//! 로깅 시스템
//!
//! 커널 전역 로깅 시스템입니다. 로그는 시리얼 포트로 출력되고
//! 최근 엔트리는 고정 크기 링 버퍼에 남습니다.
//! 네트워크 스택은 조용히 버리는 패킷의 사유를 `log_trace!`로 남깁니다.

use core::fmt;
use spin::Mutex;

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// 에러 레벨 (항상 출력)
    Error = 0,
    /// 경고 레벨
    Warn = 1,
    /// 정보 레벨
    Info = 2,
    /// 디버그 레벨
    Debug = 3,
    /// 트레이스 레벨 (패킷 드롭 사유)
    Trace = 4,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

/// 현재 로그 레벨 (`log_trace` feature로 트레이스까지 활성화)
#[cfg(feature = "log_trace")]
pub const LOG_LEVEL: LogLevel = LogLevel::Trace;
#[cfg(not(feature = "log_trace"))]
pub const LOG_LEVEL: LogLevel = LogLevel::Debug;

const RING_CAPACITY: usize = 64;
const MAX_LOG_LINE_LEN: usize = 128;

#[derive(Clone, Copy)]
struct LogEntry {
    timestamp_ms: u64,
    level: LogLevel,
    message: [u8; MAX_LOG_LINE_LEN],
    message_len: usize,
}

impl LogEntry {
    const fn new() -> Self {
        Self {
            timestamp_ms: 0,
            level: LogLevel::Info,
            message: [0; MAX_LOG_LINE_LEN],
            message_len: 0,
        }
    }

    fn set(&mut self, timestamp_ms: u64, level: LogLevel, msg: &[u8]) {
        self.timestamp_ms = timestamp_ms;
        self.level = level;
        self.message_len = msg.len().min(MAX_LOG_LINE_LEN);
        self.message[..self.message_len].copy_from_slice(&msg[..self.message_len]);
    }

    fn message(&self) -> &str {
        // 잘린 멀티바이트 문자는 유효한 접두사까지만 보여줌
        match core::str::from_utf8(&self.message[..self.message_len]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.message[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

struct LogRing {
    entries: [LogEntry; RING_CAPACITY],
    head: usize,
    count: usize,
}

impl LogRing {
    const fn new() -> Self {
        Self {
            entries: [LogEntry::new(); RING_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, timestamp_ms: u64, level: LogLevel, msg: &[u8]) {
        self.entries[self.head].set(timestamp_ms, level, msg);
        self.head = (self.head + 1) % RING_CAPACITY;
        if self.count < RING_CAPACITY {
            self.count += 1;
        }
    }

    fn for_each<F: FnMut(&LogEntry)>(&self, mut f: F) {
        let start = if self.count == RING_CAPACITY { self.head } else { 0 };
        for i in 0..self.count {
            f(&self.entries[(start + i) % RING_CAPACITY]);
        }
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());

/// 포맷팅용 고정 버퍼 (넘치는 부분은 잘림)
struct LineBuffer {
    buf: [u8; MAX_LOG_LINE_LEN],
    pos: usize,
}

impl fmt::Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let to_write = bytes.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
        self.pos += to_write;
        Ok(())
    }
}

/// 로그 출력 함수
pub fn log(level: LogLevel, args: fmt::Arguments) {
    if level > LOG_LEVEL {
        return;
    }

    let timestamp_ms = crate::drivers::timer::milliseconds();

    let mut line = LineBuffer {
        buf: [0; MAX_LOG_LINE_LEN],
        pos: 0,
    };
    let _ = fmt::Write::write_fmt(&mut line, args);

    #[cfg(not(test))]
    crate::serial_println!("{} {}", level.prefix(), args);

    // 인터럽트 컨텍스트에서 재진입하면 링 기록만 건너뜀
    if let Some(mut ring) = LOG_RING.try_lock() {
        ring.push(timestamp_ms, level, &line.buf[..line.pos]);
    }
}

/// 최근 로그를 주어진 출력으로 덤프
pub fn dump_recent(out: &mut dyn fmt::Write) -> fmt::Result {
    let ring = LOG_RING.lock();
    let mut result = Ok(());
    ring.for_each(|entry| {
        if result.is_ok() {
            result = writeln!(
                out,
                "[{}ms] {} {}",
                entry.timestamp_ms,
                entry.level.prefix(),
                entry.message()
            );
        }
    });
    result
}

/// 에러 레벨 로그 매크로
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Error, format_args!($($arg)*))
    };
}

/// 경고 레벨 로그 매크로
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// 정보 레벨 로그 매크로
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Info, format_args!($($arg)*))
    };
}

/// 디버그 레벨 로그 매크로
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Debug, format_args!($($arg)*))
    };
}

/// 트레이스 레벨 로그 매크로
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Trace, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;

    #[test]
    fn ring_keeps_latest_entries() {
        let mut ring = LogRing::new();
        for i in 0..(RING_CAPACITY + 3) {
            let msg = std::format!("entry {}", i);
            ring.push(i as u64, LogLevel::Info, msg.as_bytes());
        }
        let mut first = None;
        let mut seen = 0;
        ring.for_each(|e| {
            if first.is_none() {
                first = Some(String::from(e.message()));
            }
            seen += 1;
        });
        assert_eq!(seen, RING_CAPACITY);
        assert_eq!(first.as_deref(), Some("entry 3"));
    }

    #[test]
    fn long_lines_are_truncated() {
        let mut line = LineBuffer {
            buf: [0; MAX_LOG_LINE_LEN],
            pos: 0,
        };
        let long = "x".repeat(MAX_LOG_LINE_LEN * 2);
        fmt::Write::write_str(&mut line, &long).unwrap();
        assert_eq!(line.pos, MAX_LOG_LINE_LEN);
    }

    #[test]
    fn logged_lines_show_up_in_dump() {
        crate::log_warn!("arp cache slot {} evicted", 0);
        let mut out = String::new();
        dump_recent(&mut out).unwrap();
        assert!(out.contains("arp cache slot 0 evicted"));
    }
}
