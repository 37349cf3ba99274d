use crate::memory::Mem32;

/// Word-addressed test memory starting at address 0.
/// Reads outside the data return an undecodable word.
pub struct TestMem {
    data: Vec<u32>
}

impl TestMem {
    pub fn new(data: Vec<u32>) -> Self {
        Self {
            data
        }
    }

    /// Pack Thumb instructions, two per word.
    pub fn thumb(code: &[u16]) -> Self {
        let data = code.chunks(2)
            .map(|c| (c[0] as u32) | ((*c.get(1).unwrap_or(&0xFFFF) as u32) << 16))
            .collect();
        Self::new(data)
    }

    /// Overwrite the word at addr.
    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.data[(addr / 4) as usize] = value;
    }
}

impl Mem32 for TestMem {
    type Addr = u32;

    fn load_halfword(&mut self, addr: Self::Addr) -> u16 {
        let word = self.load_word(addr & !3);
        if addr & 2 == 0 {
            word as u16
        } else {
            (word >> 16) as u16
        }
    }

    fn load_word(&mut self, addr: Self::Addr) -> u32 {
        let idx = (addr / 4) as usize;
        self.data.get(idx).copied().unwrap_or(0xFFFF_FFFF)
    }
}
