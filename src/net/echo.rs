//! UDPTEST 에코 서버
//!
//! 받은 데이터그램을 그대로 돌려보내고, 마지막 메시지를 셸이 출력할 수 있도록 보관합니다.

use core::fmt;

use super::ethernet::EthernetDriver;
use super::ip::Ipv4Address;
use super::stack::NetworkStack;
use super::udp::UdpDatagram;
use super::NetworkError;

/// 보관하는 메시지 최대 길이
pub const MAILBOX_SIZE: usize = 256;

/// 에코 서버가 마지막으로 받은 메시지
#[derive(Clone, Copy)]
pub struct EchoMessage {
    pub source_ip: Ipv4Address,
    pub source_port: u16,
    /// 수신한 전체 길이 (잘리기 전)
    pub length: usize,
    stored: usize,
    data: [u8; MAILBOX_SIZE],
}

impl EchoMessage {
    pub fn data(&self) -> &[u8] {
        &self.data[..self.stored]
    }
}

impl fmt::Display for EchoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[UDP] Received {} bytes from {}:{}",
            self.length, self.source_ip, self.source_port
        )?;
        if self.stored == 0 {
            return Ok(());
        }
        f.write_str(" - Message: \"")?;
        for &byte in self.data() {
            match byte {
                b'\n' => f.write_str("\\n")?,
                b'\r' => f.write_str("\\r")?,
                0x20..=0x7E => fmt::Write::write_char(f, byte as char)?,
                _ => f.write_str("?")?,
            }
        }
        f.write_str("\"")
    }
}

/// 출력 대기 중인 메시지 한 개를 담는 우편함
pub struct EchoMailbox {
    pending: Option<EchoMessage>,
}

impl EchoMailbox {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// 새 메시지로 덮어씀
    pub fn record(&mut self, source_ip: Ipv4Address, source_port: u16, payload: &[u8]) {
        let stored = payload.len().min(MAILBOX_SIZE);
        let mut data = [0u8; MAILBOX_SIZE];
        data[..stored].copy_from_slice(&payload[..stored]);
        self.pending = Some(EchoMessage {
            source_ip,
            source_port,
            length: payload.len(),
            stored,
            data,
        });
    }

    /// 대기 중인 메시지를 꺼냄
    pub fn take(&mut self) -> Option<EchoMessage> {
        self.pending.take()
    }
}

impl Default for EchoMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// 에코 포트 콜백
pub fn echo_reply<D: EthernetDriver>(stack: &mut NetworkStack<D>, datagram: &UdpDatagram<'_>) {
    stack
        .echo
        .record(datagram.source_ip, datagram.source_port, datagram.payload);

    let reply = stack.udp_send(
        datagram.source_ip,
        datagram.source_port,
        datagram.destination_port,
        datagram.payload,
    );
    if let Err(err) = reply {
        crate::log_warn!("echo: reply to {}:{} failed: {}", datagram.source_ip, datagram.source_port, err);
    }
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// 설정된 에코 포트에 에코 콜백 등록
    pub fn echo_start(&mut self) -> Result<u16, NetworkError> {
        let port = self.config.echo_port;
        self.udp_register(port, echo_reply::<D>)?;
        crate::log_info!("echo: listening on UDP port {}", port);
        Ok(port)
    }

    pub fn echo_active(&self) -> bool {
        self.sockets.is_registered(self.config.echo_port)
    }
}
