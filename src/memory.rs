//! Memory interface for fetching guest code.

/// A 32-bit memory interface.
/// Capable of loading halfwords (16-bit) and words (32-bit).
///
/// The translator only fetches instructions through this, so no cycle
/// accounting is involved.
pub trait Mem32 {
    type Addr;

    fn load_halfword(&mut self, addr: Self::Addr) -> u16;
    fn load_word(&mut self, addr: Self::Addr) -> u32;
}
