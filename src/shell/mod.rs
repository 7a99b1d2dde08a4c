//! Shell 모듈
//!
//! 시리얼 콘솔에서 한 바이트씩 입력을 받아 명령어를 실행하는 간단한 Shell입니다.
//! 입력 루프가 돌 때마다 `process_frames()`를 호출해 수신 프레임을 처리하고,
//! 에코 서버가 받은 메시지를 출력합니다.

mod command;

use core::fmt::{self, Write};

use crate::net::{EthernetDriver, NetworkStack, NicProbe};

pub use command::{Command, MAX_MESSAGE_LEN};

/// 입력 버퍼 크기
pub const LINE_CAPACITY: usize = 256;

const PROMPT: &str = "net-os> ";

/// Shell 구조체
pub struct Shell<P> {
    probe: P,
    /// 현재 입력 버퍼
    line: [u8; LINE_CAPACITY],
    len: usize,
    /// 직전 바이트가 CR이었음
    after_cr: bool,
}

impl<P> Shell<P> {
    /// NETINIT에서 사용할 NIC 탐색기와 함께 생성
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            line: [0; LINE_CAPACITY],
            len: 0,
            after_cr: false,
        }
    }

    /// 시작 메시지와 첫 프롬프트 출력
    pub fn start(&self, out: &mut dyn Write) -> fmt::Result {
        writeln!(out, "Simple Net OS Shell")?;
        writeln!(out, "===================")?;
        writeln!(out, "Type 'help' for available commands.")?;
        writeln!(out)?;
        out.write_str(PROMPT)
    }

    /// 지금까지 입력된 줄
    pub fn pending_line(&self) -> &str {
        core::str::from_utf8(&self.line[..self.len]).unwrap_or("")
    }

    /// 입력 바이트 하나 처리
    pub fn handle_byte<D>(&mut self, byte: u8, stack: &mut NetworkStack<D>, out: &mut dyn Write) -> fmt::Result
    where
        D: EthernetDriver,
        P: NicProbe<D>,
    {
        let after_cr = core::mem::replace(&mut self.after_cr, byte == b'\r');
        match byte {
            // CR LF 터미널: 줄은 CR에서 이미 실행됨
            b'\n' if after_cr => {}
            b'\r' | b'\n' => {
                writeln!(out)?;
                self.execute_line(stack, out)?;
                self.len = 0;
                poll_network(stack, out)?;
                return out.write_str(PROMPT);
            }
            // Backspace / DEL
            0x08 | 0x7F => {
                if self.len > 0 {
                    self.len -= 1;
                    out.write_str("\x08 \x08")?;
                }
            }
            b'\t' => {
                for _ in 0..4 {
                    self.push(b' ', out)?;
                }
            }
            0x20..=0x7E => self.push(byte, out)?,
            _ => {}
        }
        poll_network(stack, out)
    }

    fn push(&mut self, byte: u8, out: &mut dyn Write) -> fmt::Result {
        if self.len == LINE_CAPACITY {
            return Ok(());
        }
        self.line[self.len] = byte;
        self.len += 1;
        out.write_char(byte as char)
    }

    fn execute_line<D>(&mut self, stack: &mut NetworkStack<D>, out: &mut dyn Write) -> fmt::Result
    where
        D: EthernetDriver,
        P: NicProbe<D>,
    {
        // 입력은 출력 가능한 ASCII만 받으므로 항상 UTF-8
        let Ok(input) = core::str::from_utf8(&self.line[..self.len]) else {
            return Ok(());
        };
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }

        match Command::parse(input) {
            Some(cmd) => cmd.execute(stack, &mut self.probe, out),
            None => {
                let name = input.split_whitespace().next().unwrap_or(input);
                writeln!(out, "Unknown command: '{}'", name)?;
                writeln!(out, "Type 'help' for available commands.")
            }
        }
    }
}

/// 수신 프레임을 처리하고 에코 서버가 받은 메시지를 출력
fn poll_network<D: EthernetDriver>(stack: &mut NetworkStack<D>, out: &mut dyn Write) -> fmt::Result {
    if !stack.is_initialized() {
        return Ok(());
    }
    stack.process_frames();
    if let Some(message) = stack.echo_mailbox().take() {
        writeln!(out)?;
        writeln!(out, "{}", message)?;
    }
    Ok(())
}
