//! Network stack tunables
//!
//! 모든 "타임아웃"은 벽시계 시간이 아니라 반복 횟수입니다.
//! 이 계층에는 블로킹 프리미티브가 없으므로 상한이 있는 폴링 루프로 표현합니다.

/// 페이지 테이블로 매핑되어 있는 물리 주소 구간 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioWindow {
    pub start: u64,
    pub end: u64,
}

impl MmioWindow {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// 부트 코드가 매핑해 두는 구간: 첫 1GB 아이덴티티 매핑 + 8MB MMIO 창
pub const DEFAULT_MMIO_WINDOWS: [MmioWindow; 2] = [
    MmioWindow::new(0x0000_0000, 0x4000_0000),
    MmioWindow::new(0xFE80_0000, 0xFF00_0000),
];

/// 네트워크 스택 설정
#[derive(Debug, Clone, Copy)]
pub struct NetConfig {
    /// 몇 번째 타이머 틱마다 프레임을 처리할지
    pub tick_interval: u32,
    /// DHCP 응답을 기다리며 `process_frames()`를 호출할 최대 횟수
    pub dhcp_poll_limit: u32,
    /// 디바이스 리셋 완료 대기 최대 반복 횟수
    pub reset_spin_limit: u32,
    /// EEPROM 워드 하나를 읽을 때의 최대 반복 횟수
    pub eeprom_spin_limit: u32,
    /// UDPTEST 에코 서버 포트
    pub echo_port: u16,
    /// UDPSEND 송신 포트
    pub udpsend_src_port: u16,
    /// NIC BAR가 위치해도 되는 구간
    pub mmio_windows: [MmioWindow; 2],
    /// NETINIT 직후 DHCP 시도 여부
    pub dhcp_on_init: bool,
}

impl NetConfig {
    pub const DEFAULT: NetConfig = NetConfig {
        tick_interval: 10,
        dhcp_poll_limit: 50_000,
        reset_spin_limit: 100_000,
        eeprom_spin_limit: 1_000,
        echo_port: 12345,
        udpsend_src_port: 54321,
        mmio_windows: DEFAULT_MMIO_WINDOWS,
        dhcp_on_init: true,
    };

    /// 활성화된 feature에 맞는 설정 반환
    #[inline]
    pub const fn current() -> NetConfig {
        let mut config = Self::DEFAULT;
        config.dhcp_on_init = cfg!(feature = "dhcp_on_init");
        config
    }

    /// 주소가 매핑된 구간 중 하나에 속하는지 확인
    pub fn is_mapped(&self, addr: u64) -> bool {
        self.mmio_windows.iter().any(|w| w.contains(addr))
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_windows() {
        let config = NetConfig::DEFAULT;
        assert!(config.is_mapped(0x0010_0000));
        assert!(config.is_mapped(0xFEB0_0000));
        assert!(!config.is_mapped(0x4000_0000));
        assert!(!config.is_mapped(0xFF00_0000));
        assert!(!config.is_mapped(0xE000_0000));
    }
}
