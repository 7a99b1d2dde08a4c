//! PCI (Peripheral Component Interconnect) 버스 관리
//!
//! 구성 공간 접근은 `ConfigSpace` 트레이트 뒤에 있습니다.
//! 실제 커널은 0xCF8/0xCFC 포트를 쓰는 `PortConfigSpace`를, 테스트는 가짜 구성 공간을 사용합니다.

use x86_64::instructions::port::Port;

use crate::config::MmioWindow;
use crate::net::NetworkError;

/// PCI 구성 공간 포트
const PCI_CONFIG_ADDRESS: u16 = 0xCF8;
const PCI_CONFIG_DATA: u16 = 0xCFC;

/// PCI 구성 공간 레지스터 오프셋
pub const PCI_VENDOR_ID: u8 = 0x00;
pub const PCI_COMMAND: u8 = 0x04;
pub const PCI_CLASS_REVISION: u8 = 0x08;
pub const PCI_HEADER_TYPE: u8 = 0x0C;
pub const PCI_BAR0: u8 = 0x10;
pub const PCI_INTERRUPT_LINE: u8 = 0x3C;

/// Command 레지스터 비트
pub const PCI_COMMAND_MEMORY_SPACE: u32 = 1 << 1;
pub const PCI_COMMAND_BUS_MASTER: u32 = 1 << 2;

/// PCI 클래스 코드
pub const PCI_CLASS_NETWORK: u8 = 0x02;
pub const PCI_SUBCLASS_ETHERNET: u8 = 0x00;

/// 32비트 구성 공간 접근
pub trait ConfigSpace {
    fn read_config(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32;
    fn write_config(&mut self, bus: u8, device: u8, function: u8, offset: u8, value: u32);
}

/// I/O 포트 기반 구성 공간 (Configuration Mechanism #1)
pub struct PortConfigSpace {
    address: Port<u32>,
    data: Port<u32>,
}

impl PortConfigSpace {
    /// # Safety
    /// 0xCF8/0xCFC 포트에 대한 배타적 접근이 보장되어야 합니다.
    pub const unsafe fn new() -> Self {
        Self {
            address: Port::new(PCI_CONFIG_ADDRESS),
            data: Port::new(PCI_CONFIG_DATA),
        }
    }
}

fn config_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    let enable_bit = 1 << 31;
    let bus_bits = (bus as u32) << 16;
    let device_bits = (device as u32 & 0x1F) << 11;
    let function_bits = (function as u32 & 0x07) << 8;
    let offset_bits = (offset as u32) & 0xFC;

    enable_bit | bus_bits | device_bits | function_bits | offset_bits
}

impl ConfigSpace for PortConfigSpace {
    fn read_config(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
        // SAFETY: 생성자 계약으로 포트 접근이 보장됨
        unsafe {
            self.address.write(config_address(bus, device, function, offset));
            self.data.read()
        }
    }

    fn write_config(&mut self, bus: u8, device: u8, function: u8, offset: u8, value: u32) {
        // SAFETY: 생성자 계약으로 포트 접근이 보장됨
        unsafe {
            self.address.write(config_address(bus, device, function, offset));
            self.data.write(value);
        }
    }
}

/// PCI 디바이스 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDevice {
    /// 버스 번호
    pub bus: u8,
    /// 디바이스 번호
    pub device: u8,
    /// 함수 번호
    pub function: u8,
    /// 벤더 ID
    pub vendor_id: u16,
    /// 디바이스 ID
    pub device_id: u16,
    /// 클래스 코드
    pub class_code: u8,
    /// 서브클래스
    pub subclass: u8,
    /// 프로그래밍 인터페이스
    pub prog_if: u8,
    /// 헤더 타입
    pub header_type: u8,
    /// BAR0 (베이스 주소 레지스터 0)
    pub bar0: u32,
    /// 레거시 PIC 인터럽트 라인
    pub interrupt_line: u8,
}

impl PciDevice {
    /// 구성 공간에서 디바이스 정보 읽기. 슬롯이 비어 있으면 `None`
    pub fn read<C: ConfigSpace>(config: &mut C, bus: u8, device: u8, function: u8) -> Option<Self> {
        let vendor_device = config.read_config(bus, device, function, PCI_VENDOR_ID);
        let vendor_id = vendor_device as u16;
        // 0xFFFF는 존재하지 않는 디바이스를 의미
        if vendor_id == 0xFFFF {
            return None;
        }

        let class_revision = config.read_config(bus, device, function, PCI_CLASS_REVISION);
        let header = config.read_config(bus, device, function, PCI_HEADER_TYPE);
        let bar0 = config.read_config(bus, device, function, PCI_BAR0);
        let interrupt = config.read_config(bus, device, function, PCI_INTERRUPT_LINE);

        Some(Self {
            bus,
            device,
            function,
            vendor_id,
            device_id: (vendor_device >> 16) as u16,
            class_code: (class_revision >> 24) as u8,
            subclass: (class_revision >> 16) as u8,
            prog_if: (class_revision >> 8) as u8,
            header_type: (header >> 16) as u8,
            bar0,
            interrupt_line: (interrupt & 0xFF) as u8,
        })
    }

    pub fn is_multi_function(&self) -> bool {
        self.header_type & 0x80 != 0
    }

    pub fn read_config<C: ConfigSpace>(&self, config: &mut C, offset: u8) -> u32 {
        config.read_config(self.bus, self.device, self.function, offset)
    }

    pub fn write_config<C: ConfigSpace>(&self, config: &mut C, offset: u8, value: u32) {
        config.write_config(self.bus, self.device, self.function, offset, value)
    }

    /// Bus-Master와 Memory-Space 활성화
    pub fn enable_bus_master<C: ConfigSpace>(&self, config: &mut C) {
        let command = self.read_config(config, PCI_COMMAND);
        self.write_config(
            config,
            PCI_COMMAND,
            command | PCI_COMMAND_BUS_MASTER | PCI_COMMAND_MEMORY_SPACE,
        );
    }
}

/// PCI 버스 스캔
///
/// 발견한 디바이스마다 콜백을 호출합니다. 콜백이 true를 반환하면 스캔을 중단하고
/// 해당 디바이스를 반환합니다.
pub fn scan<C, F>(config: &mut C, mut callback: F) -> Option<PciDevice>
where
    C: ConfigSpace,
    F: FnMut(&PciDevice) -> bool,
{
    for bus in 0..=255u8 {
        for device in 0..32u8 {
            let Some(first) = PciDevice::read(config, bus, device, 0) else {
                continue;
            };
            if callback(&first) {
                return Some(first);
            }
            if !first.is_multi_function() {
                continue;
            }
            for function in 1..8u8 {
                if let Some(func) = PciDevice::read(config, bus, device, function) {
                    if callback(&func) {
                        return Some(func);
                    }
                }
            }
        }
    }
    None
}

/// 벤더/디바이스 ID로 첫 번째 디바이스 찾기
pub fn find_device<C: ConfigSpace>(config: &mut C, vendor_id: u16, device_id: u16) -> Option<PciDevice> {
    scan(config, |dev| dev.vendor_id == vendor_id && dev.device_id == device_id)
}

/// 클래스/서브클래스로 첫 번째 디바이스 찾기
pub fn find_by_class<C: ConfigSpace>(config: &mut C, class_code: u8, subclass: u8) -> Option<PciDevice> {
    scan(config, |dev| dev.class_code == class_code && dev.subclass == subclass)
}

/// BAR0가 매핑된 메모리 BAR인지 확인하고 베이스 주소 반환
pub fn validate_bar(bar0: u32, windows: &[MmioWindow]) -> Result<u64, NetworkError> {
    if bar0 == 0 || bar0 == 0xFFFF_FFFF {
        return Err(NetworkError::InvalidBar);
    }
    if bar0 & 0x1 != 0 {
        return Err(NetworkError::IoMappedBar);
    }
    let base = (bar0 & !0xF) as u64;
    if !windows.iter().any(|w| w.contains(base)) {
        return Err(NetworkError::MmioNotMapped);
    }
    Ok(base)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::net::DEFAULT_MMIO_WINDOWS;
    use std::collections::BTreeMap;

    /// (bus, device, function) 단위의 256바이트 구성 공간 모음
    #[derive(Default)]
    pub(crate) struct FakeConfigSpace {
        functions: BTreeMap<(u8, u8, u8), [u32; 64]>,
    }

    impl FakeConfigSpace {
        pub(crate) fn add(
            &mut self,
            location: (u8, u8, u8),
            vendor_id: u16,
            device_id: u16,
            class: (u8, u8),
            header_type: u8,
            bar0: u32,
            irq: u8,
        ) {
            let mut regs = [0u32; 64];
            regs[0] = (device_id as u32) << 16 | vendor_id as u32;
            regs[2] = (class.0 as u32) << 24 | (class.1 as u32) << 16;
            regs[3] = (header_type as u32) << 16;
            regs[4] = bar0;
            regs[15] = 0x0100 | irq as u32;
            self.functions.insert(location, regs);
        }

        pub(crate) fn reg(&self, location: (u8, u8, u8), offset: u8) -> u32 {
            self.functions[&location][offset as usize / 4]
        }
    }

    impl ConfigSpace for FakeConfigSpace {
        fn read_config(&mut self, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
            self.functions
                .get(&(bus, device, function))
                .map(|regs| regs[offset as usize / 4])
                .unwrap_or(0xFFFF_FFFF)
        }

        fn write_config(&mut self, bus: u8, device: u8, function: u8, offset: u8, value: u32) {
            if let Some(regs) = self.functions.get_mut(&(bus, device, function)) {
                regs[offset as usize / 4] = value;
            }
        }
    }

    fn sample_bus() -> FakeConfigSpace {
        let mut config = FakeConfigSpace::default();
        // 호스트 브리지
        config.add((0, 0, 0), 0x8086, 0x1237, (0x06, 0x00), 0x00, 0, 0);
        // 다중 함수 디바이스: 함수 2에 NIC
        config.add((0, 1, 0), 0x8086, 0x7000, (0x06, 0x01), 0x80, 0, 0);
        config.add((0, 1, 2), 0x10EC, 0x8139, (0x02, 0x00), 0x00, 0xC001, 10);
        config.add((0, 3, 0), 0x8086, 0x100E, (0x02, 0x00), 0x00, 0xFEB8_0000, 11);
        config
    }

    #[test]
    fn config_address_layout() {
        assert_eq!(config_address(0, 3, 0, 0x10), 0x8000_1810);
        assert_eq!(config_address(1, 0, 2, 0x3E), 0x8001_023C);
    }

    #[test]
    fn finds_device_by_id() {
        let mut config = sample_bus();
        let dev = find_device(&mut config, 0x8086, 0x100E).unwrap();
        assert_eq!((dev.bus, dev.device, dev.function), (0, 3, 0));
        assert_eq!(dev.bar0, 0xFEB8_0000);
        assert_eq!(dev.interrupt_line, 11);
        assert_eq!(dev.class_code, PCI_CLASS_NETWORK);

        assert!(find_device(&mut config, 0x1234, 0x5678).is_none());
    }

    #[test]
    fn scans_functions_of_multi_function_devices() {
        let mut config = sample_bus();
        let dev = find_by_class(&mut config, PCI_CLASS_NETWORK, PCI_SUBCLASS_ETHERNET).unwrap();
        assert_eq!((dev.device, dev.function), (1, 2));
        assert_eq!(dev.vendor_id, 0x10EC);
    }

    #[test]
    fn enables_bus_master_and_memory_space() {
        let mut config = sample_bus();
        let dev = find_device(&mut config, 0x8086, 0x100E).unwrap();
        dev.enable_bus_master(&mut config);
        let command = config.reg((0, 3, 0), PCI_COMMAND);
        assert_eq!(command & 0b110, 0b110);
    }

    #[test]
    fn bar_validation() {
        let windows = &DEFAULT_MMIO_WINDOWS;
        assert_eq!(validate_bar(0, windows), Err(NetworkError::InvalidBar));
        assert_eq!(validate_bar(0xFFFF_FFFF, windows), Err(NetworkError::InvalidBar));
        assert_eq!(validate_bar(0xC001, windows), Err(NetworkError::IoMappedBar));
        assert_eq!(validate_bar(0xE000_0000, windows), Err(NetworkError::MmioNotMapped));
        assert_eq!(validate_bar(0xFEB8_0000, windows), Ok(0xFEB8_0000));
        // 타입/프리페치 비트는 마스킹됨
        assert_eq!(validate_bar(0x0800_000C, windows), Ok(0x0800_0000));
    }
}
