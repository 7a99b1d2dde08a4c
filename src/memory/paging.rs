//! 가상 메모리 유틸리티
//!
//! 부트로더가 모든 물리 메모리를 `physical_memory_offset`에 매핑해 두므로,
//! 페이지 테이블 조회와 MMIO 주소 계산은 이 오프셋만 있으면 됩니다.

use bootloader_api::info::Optional;
use bootloader_api::BootInfo;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::{OffsetPageTable, PageTable, Translate};
use x86_64::VirtAddr;

use crate::drivers::e1000::ring::DmaTranslate;

/// 부트로더가 설정한 페이지 테이블에 접근하기 위한 매퍼 생성
///
/// # Safety
/// - `physical_memory_offset`는 부트로더가 설정한 물리 메모리 오프셋이어야 합니다
/// - 한 번만 호출해야 합니다 (레벨 4 테이블에 대한 `&mut` 별칭 방지)
pub unsafe fn init_mapper(physical_memory_offset: VirtAddr) -> OffsetPageTable<'static> {
    let level_4_table = active_level_4_table(physical_memory_offset);
    OffsetPageTable::new(level_4_table, physical_memory_offset)
}

/// 현재 CR3가 가리키는 레벨 4 페이지 테이블
///
/// # Safety
/// `physical_memory_offset`는 부트로더가 설정한 물리 메모리 오프셋이어야 합니다.
unsafe fn active_level_4_table(physical_memory_offset: VirtAddr) -> &'static mut PageTable {
    let (level_4_table_frame, _) = Cr3::read();

    let phys = level_4_table_frame.start_address();
    let virt = physical_memory_offset + phys.as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();

    &mut *page_table_ptr
}

/// BootInfo에서 물리 메모리 오프셋 가져오기 (매핑을 요청하지 않았다면 `None`)
pub fn physical_memory_offset(boot_info: &BootInfo) -> Option<VirtAddr> {
    match boot_info.physical_memory_offset {
        Optional::Some(offset) => Some(VirtAddr::new(offset)),
        Optional::None => None,
    }
}

/// 물리 주소가 보이는 커널 가상 주소
pub fn phys_to_virt(physical_memory_offset: VirtAddr, phys: u64) -> VirtAddr {
    physical_memory_offset + phys
}

/// 페이지 테이블을 따라가 DMA용 물리 주소를 구하는 변환기
pub struct KernelDma {
    mapper: OffsetPageTable<'static>,
}

impl KernelDma {
    pub fn new(mapper: OffsetPageTable<'static>) -> Self {
        Self { mapper }
    }
}

impl DmaTranslate for KernelDma {
    fn physical_address(&self, virt: usize) -> Option<u64> {
        self.mapper
            .translate_addr(VirtAddr::new(virt as u64))
            .map(|phys| phys.as_u64())
    }
}
