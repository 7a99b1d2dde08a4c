//! 네트워크 스택 모듈
//!
//! 원시 이더넷 프레임 위에 ARP, IPv4, UDP, DHCP 클라이언트를 직접 구현합니다.
//! 모든 상태는 `NetworkStack` 하나에 모여 있고 테이블은 전부 고정 크기입니다.

pub mod arp;
pub mod dhcp;
pub mod echo;
pub mod ethernet;
pub mod ip;
pub mod stack;
pub mod udp;

#[cfg(test)]
pub(crate) mod testing;

use core::fmt;

pub use ethernet::{EtherType, EthernetDriver, MacAddress, NicProbe};
pub use ip::{IpProtocol, Ipv4Address};
pub use stack::{NetStats, NetworkStack};
pub use udp::{UdpCallback, UdpDatagram};

/// 이더넷 프레임 최대 크기 (FCS 제외)
pub const MAX_FRAME_SIZE: usize = 1518;

/// 네트워크 오류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// PCI에서 NIC를 찾지 못함
    DeviceNotFound,
    /// BAR0가 0 또는 0xFFFFFFFF
    InvalidBar,
    /// BAR0가 I/O 포트 공간
    IoMappedBar,
    /// MMIO/DMA 주소가 매핑된 구간 밖
    MmioNotMapped,
    /// 디바이스 리셋 대기 초과
    ResetTimeout,
    /// EEPROM 읽기 대기 초과
    EepromTimeout,
    /// 스택이 아직 초기화되지 않음
    NotInitialized,
    /// 프레임이 TX 버퍼보다 큼
    FrameTooLarge,
    /// 페이로드가 한 프레임에 들어가지 않음
    PayloadTooLarge,
    /// TX 링이 가득 참
    RingFull,
    /// 잘못된 패킷
    InvalidPacket,
    /// UDP 소켓 테이블이 가득 참
    SocketTableFull,
    /// DHCP 옵션 버퍼가 가득 참
    OptionsFull,
    /// DHCP OFFER를 받지 못함
    DhcpNoOffer,
    /// DHCP ACK를 받지 못함
    DhcpNoAck,
    /// 서버가 DHCP NAK로 거절
    DhcpNak,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NetworkError::DeviceNotFound => "network device not found",
            NetworkError::InvalidBar => "invalid PCI BAR0",
            NetworkError::IoMappedBar => "BAR0 is I/O mapped, MMIO required",
            NetworkError::MmioNotMapped => "address outside mapped memory",
            NetworkError::ResetTimeout => "device reset timed out",
            NetworkError::EepromTimeout => "EEPROM read timed out",
            NetworkError::NotInitialized => "network not initialized",
            NetworkError::FrameTooLarge => "frame too large",
            NetworkError::PayloadTooLarge => "payload too large",
            NetworkError::RingFull => "transmit ring full",
            NetworkError::InvalidPacket => "invalid packet",
            NetworkError::SocketTableFull => "UDP socket table full",
            NetworkError::OptionsFull => "DHCP options buffer full",
            NetworkError::DhcpNoOffer => "no DHCP offer received",
            NetworkError::DhcpNoAck => "no DHCP acknowledgement received",
            NetworkError::DhcpNak => "DHCP server refused the request",
        };
        f.write_str(msg)
    }
}
