//! Simulated firmware for driving the boot pipeline on the host.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use kernel_info::boot::{BootPixelFormat, BootPixelMasks, FramebufferInfo, KernelBootInfo};
use uefi::Status;
use uefi::boot::MemoryType;
use uefi_boot::BootError;
use uefi_boot::config::BootConfig;
use uefi_boot::firmware::{
    BootFile, ConfigurationTable, EntryTrampoline, Firmware, MemoryMapError, MemoryMapKey,
    MemoryMapMeta,
};

pub const PAGE: usize = 4096;
pub const DESC_SIZE: usize = 48;
/// Filler for freshly allocated pages, so missing zeroing shows up.
pub const GARBAGE: u8 = 0xCC;

/// Everything the simulated firmware was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Seek(u64),
    Read { position: u64, len: usize },
    AllocatePool(usize),
    AllocatePages { address: u64, pages: usize, memory_type: MemoryType },
    QueryMemoryMap { buffer_len: usize },
    ConfigurationTables,
    Framebuffer,
    Terminate(usize),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub struct SimFile {
    data: Rc<Vec<u8>>,
    position: u64,
    /// Largest chunk handed out per read call, to exercise short reads.
    max_chunk: usize,
    events: EventLog,
}

impl BootFile for SimFile {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        self.events.borrow_mut().push(Event::Read {
            position: self.position,
            len: buffer.len(),
        });
        let start = usize::try_from(self.position).unwrap().min(self.data.len());
        let len = buffer.len().min(self.data.len() - start).min(self.max_chunk);
        buffer[..len].copy_from_slice(&self.data[start..start + len]);
        self.position += len as u64;
        Ok(len)
    }

    fn set_position(&mut self, position: u64) -> Result<(), Status> {
        self.events.borrow_mut().push(Event::Seek(position));
        self.position = position;
        Ok(())
    }

    fn size(&mut self) -> Result<u64, Status> {
        Ok(self.data.len() as u64)
    }
}

pub struct Region {
    pub address: u64,
    pub pages: usize,
    pub memory_type: MemoryType,
    ptr: *const u8,
}

impl Region {
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the backing storage is leaked and never freed.
        unsafe { std::slice::from_raw_parts(self.ptr, self.pages * PAGE) }
    }
}

pub struct SimFirmware {
    pub files: HashMap<String, Rc<Vec<u8>>>,
    pub events: EventLog,
    pub regions: Vec<Region>,
    pub tables: Vec<ConfigurationTable>,
    pub framebuffer: Option<FramebufferInfo>,
    pub descriptors: usize,
    pub map_key: usize,
    /// Number of upcoming pool allocations that add a descriptor, like
    /// splitting a free range would.
    pub growing_allocations: usize,
    /// Every pool allocation fails with `OUT_OF_RESOURCES`.
    pub fail_pool_allocations: bool,
    /// Status returned by every `open_file` call instead of a lookup.
    pub open_failure: Option<Status>,
    /// Physical addresses that are already taken.
    pub unavailable: Vec<u64>,
    /// Number of upcoming `ExitBootServices` calls to reject regardless of key.
    pub reject_exits: usize,
    pub max_read_chunk: usize,
    pub terminated: bool,
}

impl SimFirmware {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            events: Rc::new(RefCell::new(Vec::new())),
            regions: Vec::new(),
            tables: Vec::new(),
            framebuffer: Some(framebuffer_1080p()),
            descriptors: 20,
            map_key: 0x1000,
            growing_allocations: 0,
            fail_pool_allocations: false,
            open_failure: None,
            unavailable: Vec::new(),
            reject_exits: 0,
            max_read_chunk: usize::MAX,
            terminated: false,
        }
    }

    pub fn with_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), Rc::new(data));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn region_at(&self, address: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.address == address)
    }

    pub fn map_size(&self) -> usize {
        self.descriptors * DESC_SIZE
    }

    fn record(&self, event: Event) {
        assert!(
            !self.terminated,
            "firmware service used after ExitBootServices: {event:?}"
        );
        self.events.borrow_mut().push(event);
    }

    fn state_changed(&mut self) {
        self.map_key += 1;
    }
}

impl Firmware for SimFirmware {
    type File = SimFile;

    fn open_file(&mut self, path: &str) -> Result<SimFile, Status> {
        self.record(Event::Open(path.to_string()));
        if let Some(status) = self.open_failure {
            return Err(status);
        }
        let data = self.files.get(path).cloned().ok_or(Status::NOT_FOUND)?;
        Ok(SimFile {
            data,
            position: 0,
            max_chunk: self.max_read_chunk,
            events: Rc::clone(&self.events),
        })
    }

    fn allocate_pool(&mut self, len: usize) -> Result<Vec<u8>, Status> {
        self.record(Event::AllocatePool(len));
        if self.fail_pool_allocations {
            return Err(Status::OUT_OF_RESOURCES);
        }
        self.state_changed();
        if self.growing_allocations > 0 {
            self.growing_allocations -= 1;
            self.descriptors += 1;
        }
        Ok(vec![0; len])
    }

    fn allocate_pages_at(
        &mut self,
        address: u64,
        pages: usize,
        memory_type: MemoryType,
    ) -> Result<&'static mut [u8], Status> {
        self.record(Event::AllocatePages {
            address,
            pages,
            memory_type,
        });
        if self.unavailable.contains(&address) {
            return Err(Status::NOT_FOUND);
        }
        self.state_changed();
        let region: &'static mut [u8] = vec![GARBAGE; pages * PAGE].leak();
        self.regions.push(Region {
            address,
            pages,
            memory_type,
            ptr: region.as_ptr(),
        });
        Ok(region)
    }

    fn query_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapMeta, MemoryMapError> {
        self.record(Event::QueryMemoryMap {
            buffer_len: buffer.len(),
        });
        let required = self.map_size();
        if buffer.len() < required {
            return Err(MemoryMapError::BufferTooSmall {
                required,
                desc_size: DESC_SIZE,
            });
        }
        for (i, desc) in buffer[..required].chunks_exact_mut(DESC_SIZE).enumerate() {
            desc.fill(u8::try_from(i % 256).unwrap());
        }
        Ok(MemoryMapMeta {
            map_size: required,
            desc_size: DESC_SIZE,
            desc_version: 1,
            map_key: MemoryMapKey(self.map_key),
        })
    }

    fn configuration_tables(&mut self) -> Vec<ConfigurationTable> {
        self.record(Event::ConfigurationTables);
        self.tables.clone()
    }

    fn framebuffer(&mut self) -> Option<FramebufferInfo> {
        self.record(Event::Framebuffer);
        self.framebuffer.clone()
    }

    fn terminate_services(&mut self, key: MemoryMapKey) -> Result<(), Status> {
        self.record(Event::Terminate(key.0));
        if self.reject_exits > 0 {
            self.reject_exits -= 1;
            // A timer event allocated behind our back.
            self.state_changed();
            self.descriptors += 1;
            return Err(Status::INVALID_PARAMETER);
        }
        if key.0 != self.map_key {
            return Err(Status::INVALID_PARAMETER);
        }
        self.terminated = true;
        Ok(())
    }
}

pub fn framebuffer_1080p() -> FramebufferInfo {
    FramebufferInfo {
        framebuffer_ptr: 0x8000_0000,
        framebuffer_size: 1920 * 1080 * 4,
        framebuffer_width: 1920,
        framebuffer_height: 1080,
        framebuffer_stride: 1920,
        framebuffer_format: BootPixelFormat::Bgr,
        framebuffer_masks: BootPixelMasks::default(),
    }
}

/// What the kernel saw when the simulated jump happened.
#[derive(Debug, Clone)]
pub struct KernelEntered {
    pub entry: u64,
    pub boot_info: KernelBootInfo,
    pub boot_info_addr: u64,
}

/// Simulates the jump by unwinding with a [`KernelEntered`] payload.
pub struct SimTrampoline;

impl EntryTrampoline for SimTrampoline {
    unsafe fn enter(&self, entry: u64, boot_info: &'static KernelBootInfo) -> ! {
        panic::panic_any(KernelEntered {
            entry,
            boot_info: boot_info.clone(),
            boot_info_addr: std::ptr::from_ref(boot_info) as u64,
        })
    }
}

pub enum Outcome {
    Entered(KernelEntered),
    Failed(BootError),
}

impl Outcome {
    pub fn entered(self) -> KernelEntered {
        match self {
            Self::Entered(k) => k,
            Self::Failed(e) => panic!("expected the kernel to be entered, boot failed: {e}"),
        }
    }

    pub fn failed(self) -> BootError {
        match self {
            Self::Entered(k) => panic!("expected boot to fail, kernel entered at {:#x}", k.entry),
            Self::Failed(e) => e,
        }
    }
}

pub fn run_boot(firmware: &mut SimFirmware, config: &BootConfig) -> Outcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        uefi_boot::boot(firmware, &SimTrampoline, config)
    }));
    match result {
        Ok(Ok(never)) => match never {},
        Ok(Err(e)) => Outcome::Failed(e),
        Err(payload) => match payload.downcast::<KernelEntered>() {
            Ok(entered) => Outcome::Entered(*entered),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Minimal ELF64 image builder.
pub struct ElfBuilder {
    pub entry: u64,
    pub e_type: u16,
    pub machine: u16,
    pub phentsize: u16,
    pub segments: Vec<SegmentSpec>,
}

pub struct SegmentSpec {
    pub p_type: u32,
    pub flags: u32,
    pub paddr: u64,
    pub data: Vec<u8>,
    pub memsz: u64,
}

impl SegmentSpec {
    pub fn load(paddr: u64, data: Vec<u8>, memsz: u64) -> Self {
        Self {
            p_type: 1,
            flags: 0b101,
            paddr,
            data,
            memsz,
        }
    }
}

impl ElfBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            e_type: 2,
            machine: 62,
            phentsize: 56,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = 64usize;
        let table_len = self.segments.len() * usize::from(self.phentsize);
        let mut data_off = (phoff + table_len).div_ceil(PAGE) * PAGE;

        let mut image = vec![0u8; data_off];
        image[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        image[4] = 2;
        image[5] = 1;
        image[6] = 1;
        image[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        image[18..20].copy_from_slice(&self.machine.to_le_bytes());
        image[20..24].copy_from_slice(&1u32.to_le_bytes());
        image[24..32].copy_from_slice(&self.entry.to_le_bytes());
        image[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        image[52..54].copy_from_slice(&64u16.to_le_bytes());
        image[54..56].copy_from_slice(&self.phentsize.to_le_bytes());
        image[56..58].copy_from_slice(&u16::try_from(self.segments.len()).unwrap().to_le_bytes());

        for (i, seg) in self.segments.iter().enumerate() {
            let at = phoff + i * usize::from(self.phentsize);
            let ph = &mut image[at..at + 56];
            ph[0..4].copy_from_slice(&seg.p_type.to_le_bytes());
            ph[4..8].copy_from_slice(&seg.flags.to_le_bytes());
            ph[8..16].copy_from_slice(&(data_off as u64).to_le_bytes());
            ph[16..24].copy_from_slice(&seg.paddr.to_le_bytes());
            ph[24..32].copy_from_slice(&seg.paddr.to_le_bytes());
            ph[32..40].copy_from_slice(&(seg.data.len() as u64).to_le_bytes());
            ph[40..48].copy_from_slice(&seg.memsz.to_le_bytes());
            ph[48..56].copy_from_slice(&(PAGE as u64).to_le_bytes());
            data_off += seg.data.len();
        }

        for seg in &self.segments {
            image.extend_from_slice(&seg.data);
        }
        image
    }
}

/// Deterministic, non-zero file content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) | 1)
        .collect()
}

/// A PSF1 font file with `mode` and `charsize`.
pub fn psf1_font(mode: u8, charsize: u8) -> Vec<u8> {
    let glyphs = if mode & 1 != 0 { 512 } else { 256 };
    let mut font = vec![0x36, 0x04, mode, charsize];
    font.extend(pattern(glyphs * usize::from(charsize), 7));
    font
}
