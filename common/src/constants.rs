
// CPU-side (16-bit) view of the Unibus.
pub const MMIO_START: u16 = 0o160000;

// Physical (18-bit) Unibus address space.
pub const IO_PAGE_START: u32 = 0o760000;
pub const UNIBUS_END: u32 = 0o1000000; // Exclusive, note type

pub const WORD_MASK: u32 = 0o177777;
pub const WORD12_MASK: u32 = 0o7777;
pub const WORD18_MASK: u32 = 0o777777;
