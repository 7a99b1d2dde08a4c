//! 이더넷 프레임과 드라이버 인터페이스
//!
//! 헤더는 바이트 슬라이스에서 직접 파싱/직렬화합니다 (packed 구조체 캐스팅 없음).

use core::fmt;

use super::NetworkError;

/// MAC 주소 (6바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// 브로드캐스트 MAC 주소
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[..6]);
        MacAddress(mac)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// EtherType
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Arp,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x0806 => EtherType::Arp,
            n => EtherType::Unknown(n),
        }
    }
}

impl From<EtherType> for u16 {
    fn from(ether_type: EtherType) -> Self {
        match ether_type {
            EtherType::Ipv4 => 0x0800,
            EtherType::Arp => 0x0806,
            EtherType::Unknown(n) => n,
        }
    }
}

/// 이더넷 II 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ether_type: EtherType,
}

impl EthernetHeader {
    pub const SIZE: usize = 14;

    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            destination: MacAddress::from_slice(&frame[0..6]),
            source: MacAddress::from_slice(&frame[6..12]),
            ether_type: u16::from_be_bytes([frame[12], frame[13]]).into(),
        })
    }

    /// `buf` 앞 14바이트에 헤더 기록
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.destination.0);
        buf[6..12].copy_from_slice(&self.source.0);
        buf[12..14].copy_from_slice(&u16::from(self.ether_type).to_be_bytes());
    }
}

/// 이더넷 드라이버 트레이트
///
/// 스택은 이 인터페이스로만 NIC를 다룹니다. 송신은 링이 차면 즉시 실패하고,
/// 수신은 대기 중인 프레임이 없으면 0을 반환합니다.
pub trait EthernetDriver {
    /// 드라이버 이름
    fn name(&self) -> &str;

    fn mac_address(&self) -> MacAddress;

    /// 완성된 이더넷 프레임 송신 (FCS는 하드웨어가 붙임)
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetworkError>;

    /// 수신 프레임 하나를 `buffer`에 복사하고 길이 반환
    fn receive_frame(&mut self, buffer: &mut [u8]) -> usize;
}

/// NETINIT이 사용하는 NIC 탐색/초기화 절차
///
/// 진단 메시지는 `out`으로 출력합니다.
pub trait NicProbe<D: EthernetDriver> {
    fn probe(&mut self, out: &mut dyn fmt::Write) -> Result<D, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn mac_display_is_uppercase_colon_separated() {
        let mac = MacAddress([0x52, 0x54, 0x00, 0xab, 0xcd, 0x0f]);
        assert_eq!(mac.to_string(), "52:54:00:AB:CD:0F");
    }

    #[test]
    fn header_layout() {
        let header = EthernetHeader {
            destination: MacAddress::BROADCAST,
            source: MacAddress([1, 2, 3, 4, 5, 6]),
            ether_type: EtherType::Arp,
        };
        let mut buf = [0u8; EthernetHeader::SIZE];
        header.write_to(&mut buf);
        assert_eq!(&buf[12..], &[0x08, 0x06]);
        assert_eq!(EthernetHeader::parse(&buf), Some(header));
        assert_eq!(EthernetHeader::parse(&buf[..13]), None);
    }

    #[test]
    fn unknown_ether_type_is_preserved() {
        assert_eq!(EtherType::from(0x86DD), EtherType::Unknown(0x86DD));
        assert_eq!(u16::from(EtherType::Unknown(0x86DD)), 0x86DD);
    }
}
