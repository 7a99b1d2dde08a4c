//! E1000 레지스터 오프셋과 제어 비트

use bitflags::bitflags;
use volatile::Volatile;

pub const CTRL: u32 = 0x0000;
pub const STATUS: u32 = 0x0008;
pub const EERD: u32 = 0x0014;
pub const ICR: u32 = 0x00C0;
pub const IMS: u32 = 0x00D0;
pub const IMC: u32 = 0x00D8;
pub const RCTL: u32 = 0x0100;
pub const TCTL: u32 = 0x0400;
pub const TIPG: u32 = 0x0410;
pub const RDBAL: u32 = 0x2800;
pub const RDBAH: u32 = 0x2804;
pub const RDLEN: u32 = 0x2808;
pub const RDH: u32 = 0x2810;
pub const RDT: u32 = 0x2818;
pub const TDBAL: u32 = 0x3800;
pub const TDBAH: u32 = 0x3804;
pub const TDLEN: u32 = 0x3808;
pub const TDH: u32 = 0x3810;
pub const TDT: u32 = 0x3818;
pub const RAL: u32 = 0x5400;
pub const RAH: u32 = 0x5404;

/// 레지스터 공간 크기 (BAR0 128KB)
pub const MMIO_SIZE: usize = 0x2_0000;

/// IEEE 802.3 표준 IPG 값
pub const TIPG_DEFAULT: u32 = 0x0060_200A;

/// EERD: 읽기 시작 / 완료 / 데이터 위치
pub const EERD_START: u32 = 1 << 0;
pub const EERD_DONE: u32 = 1 << 4;
pub const EERD_ADDR_SHIFT: u32 = 8;
pub const EERD_DATA_SHIFT: u32 = 16;

bitflags! {
    /// Device Control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl: u32 {
        const SLU = 1 << 6;
        const RST = 1 << 26;
    }
}

bitflags! {
    /// Receive Control
    ///
    /// BSIZE 비트(16-17)가 00이면 2048바이트 버퍼입니다.
    /// SECRC는 켜지 않습니다. 수신 경로가 FCS 4바이트를 직접 잘라냅니다.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rctl: u32 {
        const EN = 1 << 1;
        /// Store Bad Packets
        const SBP = 1 << 2;
        /// Unicast Promiscuous
        const UPE = 1 << 3;
        /// Multicast Promiscuous
        const MPE = 1 << 4;
        /// Long Packet Enable
        const LPE = 1 << 5;
        /// Broadcast Accept Mode
        const BAM = 1 << 15;
    }
}

bitflags! {
    /// Transmit Control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tctl: u32 {
        const EN = 1 << 1;
        /// Pad Short Packets
        const PSP = 1 << 3;
        /// Collision Threshold = 0x10
        const CT_DEFAULT = 0x10 << 4;
        /// Collision Distance = 0x40 (전이중)
        const COLD_DEFAULT = 0x40 << 12;
    }
}

bitflags! {
    /// TX 디스크립터 command 바이트
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxCommand: u8 {
        /// End Of Packet
        const EOP = 1 << 0;
        /// Insert FCS
        const IFCS = 1 << 1;
        /// Report Status
        const RS = 1 << 3;
    }
}

bitflags! {
    /// 디스크립터 status 바이트 (TX/RX 공통 하위 비트)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescStatus: u8 {
        /// Descriptor Done
        const DD = 1 << 0;
        /// End Of Packet (RX)
        const EOP = 1 << 1;
    }
}

/// NIC 레지스터 접근
///
/// 실제 하드웨어는 `MmioRegisters`, 테스트는 시뮬레이션 레지스터 파일을 사용합니다.
pub trait NicRegisters {
    fn read(&self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);
}

/// BAR0에 매핑된 MMIO 레지스터
pub struct MmioRegisters {
    base: usize,
}

impl MmioRegisters {
    /// # Safety
    /// `base`는 E1000 레지스터 공간 전체(`MMIO_SIZE`)가 매핑된 가상 주소여야 하며,
    /// 다른 코드가 같은 영역에 접근하지 않아야 합니다.
    pub unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn reg_ptr(&self, offset: u32) -> *mut u32 {
        (self.base + offset as usize) as *mut u32
    }
}

impl NicRegisters for MmioRegisters {
    fn read(&self, offset: u32) -> u32 {
        // SAFETY: 생성자 계약으로 base..base+MMIO_SIZE가 매핑되어 있음
        unsafe { Volatile::new(&*self.reg_ptr(offset)).read() }
    }

    fn write(&mut self, offset: u32, value: u32) {
        // SAFETY: 생성자 계약으로 base..base+MMIO_SIZE가 매핑되어 있음
        unsafe { Volatile::new(&mut *self.reg_ptr(offset)).write(value) }
    }
}
