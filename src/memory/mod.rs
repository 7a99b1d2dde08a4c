//! 메모리 관리 모듈
//!
//! 힙은 없습니다. NIC 드라이버가 쓰는 MMIO 주소 계산과 DMA 주소 변환만 담당합니다.

pub mod paging;

pub use paging::{init_mapper, phys_to_virt, physical_memory_offset, KernelDma};
