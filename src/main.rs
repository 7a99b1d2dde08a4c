//! Simple Net OS Kernel Entry Point
//!
//! 부트로더가 커널을 로드한 후 `kernel_main`이 호출됩니다.
//! 베어메탈 타깃(`target_os = "none"`)에서만 커널로 빌드되고,
//! 호스트 빌드에서는 빈 `main`만 남습니다.

#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(target_os = "none")]
mod kernel {
    use core::fmt::Write;
    use core::panic::PanicInfo;

    use bootloader_api::config::{BootloaderConfig, Mapping};
    use bootloader_api::{entry_point, BootInfo};
    use spin::Mutex;

    use simple_net_os::config::NetConfig;
    use simple_net_os::drivers::e1000::regs::MmioRegisters;
    use simple_net_os::drivers::e1000::ring::claim_ring_memory;
    use simple_net_os::drivers::e1000::{E1000Probe, E1000};
    use simple_net_os::drivers::pci::PortConfigSpace;
    use simple_net_os::drivers::serial::{self, SerialWriter};
    use simple_net_os::drivers::timer;
    use simple_net_os::interrupts::{self, idt, pic};
    use simple_net_os::memory::{self, KernelDma};
    use simple_net_os::net::NetworkStack;
    use simple_net_os::shell::Shell;
    use simple_net_os::{log_error, log_info, serial_println};

    /// NIC BAR에 접근하려면 물리 메모리 전체가 매핑되어 있어야 함
    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        config
    };

    entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

    type Nic = E1000<MmioRegisters>;

    /// 커널 전체에서 하나뿐인 네트워크 스택
    static NETWORK: Mutex<NetworkStack<Nic>> = Mutex::new(NetworkStack::new(NetConfig::current()));

    /// 타이머 틱 훅. 셸이 스택을 잡고 있으면 이번 틱은 건너뜀
    fn network_tick() {
        if let Some(mut stack) = NETWORK.try_lock() {
            stack.on_tick(timer::ticks());
        }
    }

    /// 커널 엔트리 포인트
    ///
    /// 초기화 순서:
    /// 1. 시리얼 콘솔
    /// 2. IDT, PIC, PIT (100Hz)
    /// 3. 페이지 테이블 매퍼와 NIC 탐색기
    /// 4. 셸 루프
    fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
        serial::init();
        log_info!("Simple Net OS booting");

        idt::init();
        // SAFETY: 부팅 중 한 번만 호출되며 아직 인터럽트가 꺼져 있음
        unsafe {
            pic::init();
            timer::init();
        }
        if let Err(err) = interrupts::register_handler(0, timer::tick) {
            log_error!("timer IRQ registration failed: {}", err);
        }
        timer::set_tick_hook(network_tick);
        x86_64::instructions::interrupts::enable();

        let Some(phys_offset) = memory::physical_memory_offset(boot_info) else {
            log_error!("bootloader did not map physical memory");
            halt_forever();
        };
        // SAFETY: 오프셋은 부트로더가 준 값이고 매퍼는 여기서 한 번만 만듦
        let dma = KernelDma::new(unsafe { memory::init_mapper(phys_offset) });

        let Some(rings) = claim_ring_memory() else {
            log_error!("descriptor ring memory already claimed");
            halt_forever();
        };
        let map_registers = move |base: u64| {
            let virt = memory::phys_to_virt(phys_offset, base);
            // SAFETY: BAR는 검증된 매핑 구간 안에 있고 이 드라이버만 사용함
            unsafe { MmioRegisters::new(virt.as_u64() as usize) }
        };
        // SAFETY: PCI 설정 포트는 이 탐색기만 사용함
        let config_space = unsafe { PortConfigSpace::new() };
        let probe = E1000Probe::new(config_space, dma, map_registers, rings, NetConfig::current());

        let mut shell = Shell::new(probe);
        let mut console = SerialWriter;
        let _ = shell.start(&mut console);

        loop {
            match serial::try_read_byte() {
                Some(byte) => {
                    let mut stack = NETWORK.lock();
                    let _ = shell.handle_byte(byte, &mut stack, &mut console);
                }
                None => x86_64::instructions::hlt(),
            }
        }
    }

    fn halt_forever() -> ! {
        loop {
            x86_64::instructions::hlt();
        }
    }

    /// 패닉 핸들러
    ///
    /// 패닉 메시지와 최근 로그를 시리얼로 출력하고 정지합니다.
    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        x86_64::instructions::interrupts::disable();
        serial_println!("KERNEL PANIC: {}", info);
        let mut console = SerialWriter;
        let _ = writeln!(console, "--- recent log ---");
        let _ = simple_net_os::logging::dump_recent(&mut console);
        halt_forever()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
