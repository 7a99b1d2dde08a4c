//! 디스크립터 링과 DMA 버퍼 아레나
//!
//! 링 슬롯 i는 버퍼 슬롯 i를 독점합니다. 하드웨어가 DD 비트를 세워 돌려주기 전까지
//! 드라이버는 그 버퍼를 다시 쓰지 않습니다.

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};
use volatile::Volatile;

use super::regs::{DescStatus, TxCommand};

/// 링당 디스크립터 수
pub const RING_SIZE: usize = 32;
/// 디스크립터 하나가 가리키는 버퍼 크기
pub const BUFFER_SIZE: usize = 2048;
/// 하드웨어가 프레임 끝에 붙이는 FCS 길이
pub const FCS_LEN: usize = 4;

/// Legacy TX 디스크립터 (16바이트)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TxDescriptor {
    pub buffer_addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

/// Legacy RX 디스크립터 (16바이트)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RxDescriptor {
    pub buffer_addr: u64,
    pub length: u16,
    pub checksum: u16,
    pub status: u8,
    pub errors: u8,
    pub special: u16,
}

impl TxDescriptor {
    const EMPTY: Self = Self {
        buffer_addr: 0,
        length: 0,
        cso: 0,
        cmd: 0,
        status: 0,
        css: 0,
        special: 0,
    };

    /// 하드웨어가 쓰는 status 바이트 읽기
    pub fn status(&self) -> DescStatus {
        DescStatus::from_bits_retain(Volatile::new(&self.status).read())
    }

    pub fn set_status(&mut self, status: DescStatus) {
        Volatile::new(&mut self.status).write(status.bits());
    }

    pub fn length(&self) -> u16 {
        Volatile::new(&self.length).read()
    }

    pub fn set_length(&mut self, length: u16) {
        Volatile::new(&mut self.length).write(length);
    }

    pub fn command(&self) -> TxCommand {
        TxCommand::from_bits_retain(Volatile::new(&self.cmd).read())
    }

    pub fn set_command(&mut self, command: TxCommand) {
        Volatile::new(&mut self.cmd).write(command.bits());
    }
}

impl RxDescriptor {
    const EMPTY: Self = Self {
        buffer_addr: 0,
        length: 0,
        checksum: 0,
        status: 0,
        errors: 0,
        special: 0,
    };

    pub fn status(&self) -> DescStatus {
        DescStatus::from_bits_retain(Volatile::new(&self.status).read())
    }

    pub fn set_status(&mut self, status: DescStatus) {
        Volatile::new(&mut self.status).write(status.bits());
    }

    pub fn length(&self) -> u16 {
        Volatile::new(&self.length).read()
    }

    pub fn set_length(&mut self, length: u16) {
        Volatile::new(&mut self.length).write(length);
    }

    /// 0이 아니면 CRC/심볼/시퀀스 오류 등으로 깨진 프레임
    pub fn errors(&self) -> u8 {
        Volatile::new(&self.errors).read()
    }

    pub fn set_errors(&mut self, errors: u8) {
        Volatile::new(&mut self.errors).write(errors);
    }
}

/// 페이지 경계를 넘지 않도록 2KB 정렬된 버퍼
#[repr(C, align(2048))]
pub struct FrameBuffer(pub [u8; BUFFER_SIZE]);

impl FrameBuffer {
    const EMPTY: Self = Self([0; BUFFER_SIZE]);
}

/// TX/RX 디스크립터 링과 버퍼 전체
///
/// 하드웨어는 디스크립터 베이스가 16바이트 정렬이기를 요구합니다.
#[repr(C, align(4096))]
pub struct RingMemory {
    pub tx_descriptors: [TxDescriptor; RING_SIZE],
    pub rx_descriptors: [RxDescriptor; RING_SIZE],
    pub tx_buffers: [FrameBuffer; RING_SIZE],
    pub rx_buffers: [FrameBuffer; RING_SIZE],
}

impl RingMemory {
    pub const fn new() -> Self {
        Self {
            tx_descriptors: [TxDescriptor::EMPTY; RING_SIZE],
            rx_descriptors: [RxDescriptor::EMPTY; RING_SIZE],
            tx_buffers: [FrameBuffer::EMPTY; RING_SIZE],
            rx_buffers: [FrameBuffer::EMPTY; RING_SIZE],
        }
    }
}

impl Default for RingMemory {
    fn default() -> Self {
        Self::new()
    }
}

static mut RING_MEMORY: RingMemory = RingMemory::new();
static RING_MEMORY_TAKEN: AtomicBool = AtomicBool::new(false);

/// 정적 링 메모리를 한 번만 꺼내줌. 두 번째 호출부터는 `None`
pub fn claim_ring_memory() -> Option<&'static mut RingMemory> {
    if RING_MEMORY_TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: 위 플래그로 단 한 번만 참조를 만들어 줌
    Some(unsafe { &mut *addr_of_mut!(RING_MEMORY) })
}

/// 커널 가상 주소 → 디바이스가 볼 물리 주소
pub trait DmaTranslate {
    fn physical_address(&self, virt: usize) -> Option<u64>;
}

/// 아이덴티티 매핑 환경
pub struct IdentityDma;

impl DmaTranslate for IdentityDma {
    fn physical_address(&self, virt: usize) -> Option<u64> {
        Some(virt as u64)
    }
}
