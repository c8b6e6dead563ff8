// src/layout.rs

use std::str::FromStr;

/// Bytes in the edge-coverage bitmap that precedes the scoring region
pub const MAP_SIZE: usize = 1 << 16;

/// Fitness is stored as `round(fitness * INTEGER_SCALE)` in integer layouts
pub const INTEGER_SCALE: f64 = 1000.0;

/// Bytes per comparison site in the operand table
pub const CMP_SLOT: usize = 8;

/// Platform word of the scoring fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordSize {
    W4,
    #[default]
    W8,
}

impl WordSize {
    pub fn bytes(self) -> usize {
        match self {
            WordSize::W4 => 4,
            WordSize::W8 => 8,
        }
    }
}

impl FromStr for WordSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "4" | "32" => Ok(WordSize::W4),
            "8" | "64" => Ok(WordSize::W8),
            other => Err(format!("unsupported word size `{other}`")),
        }
    }
}

/// Representation of the accumulated fitness field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitnessEncoding {
    /// Unsigned word, fitness scaled by [`INTEGER_SCALE`], wrapping on overflow
    Integer,
    /// IEEE float of the word's width
    #[default]
    Double,
}

impl FromStr for FitnessEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(FitnessEncoding::Integer),
            "double" | "float" => Ok(FitnessEncoding::Double),
            other => Err(format!("unknown fitness encoding `{other}`")),
        }
    }
}

/// Fitness totals read back from a scoring region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSnapshot {
    pub fitness: f64,
    pub count: u64,
}

impl ScoreSnapshot {
    /// Mean fitness of the contributing blocks
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.fitness / self.count as f64)
    }
}

/// The extension appended after the edge bitmap:
///
/// | offset | field |
/// |---|---|
/// | 0 | accumulated fitness, one word |
/// | W | contributing block count, one word |
/// | 2W | `cmp_sites` slots of 8 bytes, XOR-folded operands |
///
/// Fields are native-endian, like the rest of the shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoringLayout {
    pub word: WordSize,
    pub encoding: FitnessEncoding,
    pub cmp_sites: usize,
}

impl ScoringLayout {
    pub fn fitness_offset(&self) -> usize {
        0
    }

    pub fn count_offset(&self) -> usize {
        self.word.bytes()
    }

    pub fn cmp_offset(&self) -> usize {
        2 * self.word.bytes()
    }

    /// Bytes of the extension alone
    pub fn size(&self) -> usize {
        self.cmp_offset() + CMP_SLOT * self.cmp_sites
    }

    /// Bytes of bitmap plus extension
    pub fn total_size(&self) -> usize {
        MAP_SIZE + self.size()
    }

    /// Add `fitness` to the total and bump the count.
    ///
    /// `region` is the extension that follows the bitmap and must hold at
    /// least [`size`](Self::size) bytes. Shorter regions panic.
    pub fn record(&self, region: &mut [u8], fitness: f64) {
        self.check_region(region);
        let at = self.fitness_offset();
        match (self.encoding, self.word) {
            (FitnessEncoding::Double, WordSize::W8) => {
                let total = f64::from_ne_bytes(word8(region, at));
                region[at..at + 8].copy_from_slice(&(total + fitness).to_ne_bytes());
            }
            (FitnessEncoding::Double, WordSize::W4) => {
                let total = f32::from_ne_bytes(word4(region, at));
                region[at..at + 4].copy_from_slice(&(total + fitness as f32).to_ne_bytes());
            }
            (FitnessEncoding::Integer, WordSize::W8) => {
                let total = u64::from_ne_bytes(word8(region, at));
                let add = scaled(fitness);
                region[at..at + 8].copy_from_slice(&total.wrapping_add(add).to_ne_bytes());
            }
            (FitnessEncoding::Integer, WordSize::W4) => {
                let total = u32::from_ne_bytes(word4(region, at));
                let add = scaled(fitness) as u32;
                region[at..at + 4].copy_from_slice(&total.wrapping_add(add).to_ne_bytes());
            }
        }

        let at = self.count_offset();
        match self.word {
            WordSize::W8 => {
                let count = u64::from_ne_bytes(word8(region, at)).wrapping_add(1);
                region[at..at + 8].copy_from_slice(&count.to_ne_bytes());
            }
            WordSize::W4 => {
                let count = u32::from_ne_bytes(word4(region, at)).wrapping_add(1);
                region[at..at + 4].copy_from_slice(&count.to_ne_bytes());
            }
        }
    }

    /// Read the fitness total and count back. Same length rule as [`record`](Self::record).
    pub fn snapshot(&self, region: &[u8]) -> ScoreSnapshot {
        self.check_region(region);
        let at = self.fitness_offset();
        let fitness = match (self.encoding, self.word) {
            (FitnessEncoding::Double, WordSize::W8) => f64::from_ne_bytes(word8(region, at)),
            (FitnessEncoding::Double, WordSize::W4) => {
                f64::from(f32::from_ne_bytes(word4(region, at)))
            }
            (FitnessEncoding::Integer, WordSize::W8) => {
                u64::from_ne_bytes(word8(region, at)) as f64 / INTEGER_SCALE
            }
            (FitnessEncoding::Integer, WordSize::W4) => {
                f64::from(u32::from_ne_bytes(word4(region, at))) / INTEGER_SCALE
            }
        };
        let at = self.count_offset();
        let count = match self.word {
            WordSize::W8 => u64::from_ne_bytes(word8(region, at)),
            WordSize::W4 => u64::from(u32::from_ne_bytes(word4(region, at))),
        };
        ScoreSnapshot { fitness, count }
    }

    /// Fold the operands of a comparison into its site's slot.
    /// Sites past the table wrap around. `region` must hold [`size`](Self::size) bytes.
    pub fn record_cmp(&self, region: &mut [u8], site: usize, lhs: u64, rhs: u64) {
        self.check_region(region);
        if self.cmp_sites == 0 {
            return;
        }
        let at = self.cmp_offset() + CMP_SLOT * (site % self.cmp_sites);
        let folded = u64::from_ne_bytes(word8(region, at)) ^ lhs ^ rhs;
        region[at..at + 8].copy_from_slice(&folded.to_ne_bytes());
    }

    pub fn cmp_slot(&self, region: &[u8], site: usize) -> u64 {
        self.check_region(region);
        if self.cmp_sites == 0 {
            return 0;
        }
        u64::from_ne_bytes(word8(region, self.cmp_offset() + CMP_SLOT * (site % self.cmp_sites)))
    }

    fn check_region(&self, region: &[u8]) {
        debug_assert!(
            region.len() >= self.size(),
            "scoring region of {} bytes, layout needs {}",
            region.len(),
            self.size()
        );
    }
}

fn scaled(fitness: f64) -> u64 {
    // saturating float-to-int cast; negative fitness is never produced
    (fitness * INTEGER_SCALE).round() as u64
}

fn word8(region: &[u8], at: usize) -> [u8; 8] {
    let mut word = [0u8; 8];
    word.copy_from_slice(&region[at..at + 8]);
    word
}

fn word4(region: &[u8], at: usize) -> [u8; 4] {
    let mut word = [0u8; 4];
    word.copy_from_slice(&region[at..at + 4]);
    word
}

/// In-memory stand-in for the shared region of an instrumented binary
pub struct CoverageMap {
    layout: ScoringLayout,
    bytes: Vec<u8>,
    prev_loc: u32,
}

impl CoverageMap {
    pub fn new(layout: ScoringLayout) -> Self {
        CoverageMap {
            layout,
            bytes: vec![0; layout.total_size()],
            prev_loc: 0,
        }
    }

    /// What the instrumentation of a block does when the block runs
    pub fn visit(&mut self, cur_loc: u32, fitness: Option<f64>) {
        let edge = ((self.prev_loc ^ cur_loc) as usize) % MAP_SIZE;
        self.bytes[edge] = self.bytes[edge].wrapping_add(1);
        self.prev_loc = cur_loc >> 1;

        if let Some(fitness) = fitness {
            self.layout.record(&mut self.bytes[MAP_SIZE..], fitness);
        }
    }

    /// Start a new execution: clear everything and forget the previous block
    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.prev_loc = 0;
    }

    pub fn edges(&self) -> &[u8] {
        &self.bytes[..MAP_SIZE]
    }

    pub fn region(&self) -> &[u8] {
        &self.bytes[MAP_SIZE..]
    }

    pub fn region_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[MAP_SIZE..]
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        self.layout.snapshot(self.region())
    }

    pub fn layout(&self) -> &ScoringLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(word: WordSize, encoding: FitnessEncoding) -> ScoringLayout {
        ScoringLayout {
            word,
            encoding,
            cmp_sites: 0,
        }
    }

    #[test]
    fn offsets_follow_word_size() {
        let narrow = ScoringLayout {
            word: WordSize::W4,
            encoding: FitnessEncoding::Integer,
            cmp_sites: 3,
        };
        assert_eq!(narrow.count_offset(), 4);
        assert_eq!(narrow.cmp_offset(), 8);
        assert_eq!(narrow.size(), 32);
        assert_eq!(narrow.total_size(), MAP_SIZE + 32);

        let wide = layout(WordSize::W8, FitnessEncoding::Double);
        assert_eq!(wide.count_offset(), 8);
        assert_eq!(wide.size(), 16);
    }

    #[test]
    fn double_fields_are_native_endian() {
        let layout = layout(WordSize::W8, FitnessEncoding::Double);
        let mut region = vec![0u8; layout.size()];
        layout.record(&mut region, 0.25);
        layout.record(&mut region, 0.5);

        assert_eq!(region[0..8], 0.75f64.to_ne_bytes());
        assert_eq!(region[8..16], 2u64.to_ne_bytes());
        let snapshot = layout.snapshot(&region);
        assert_eq!(snapshot.fitness, 0.75);
        assert_eq!(snapshot.mean(), Some(0.375));
    }

    #[test]
    fn integer_fitness_is_scaled() {
        let layout = layout(WordSize::W4, FitnessEncoding::Integer);
        let mut region = vec![0u8; layout.size()];
        layout.record(&mut region, 1.5);
        layout.record(&mut region, 0.0004);

        assert_eq!(region[0..4], 1500u32.to_ne_bytes());
        assert_eq!(region[4..8], 2u32.to_ne_bytes());
        assert_eq!(layout.snapshot(&region).fitness, 1.5);
    }

    #[test]
    fn integer_total_wraps() {
        let layout = layout(WordSize::W4, FitnessEncoding::Integer);
        let mut region = vec![0u8; layout.size()];
        region[0..4].copy_from_slice(&(u32::MAX - 499).to_ne_bytes());
        layout.record(&mut region, 1.0);
        assert_eq!(region[0..4], 500u32.to_ne_bytes());
    }

    #[test]
    fn single_precision_fitness() {
        let layout = layout(WordSize::W4, FitnessEncoding::Double);
        let mut region = vec![0u8; layout.size()];
        layout.record(&mut region, 0.5);
        assert_eq!(region[0..4], 0.5f32.to_ne_bytes());
    }

    #[test]
    fn empty_region_has_no_mean() {
        let layout = ScoringLayout::default();
        let region = vec![0u8; layout.size()];
        assert_eq!(layout.snapshot(&region).mean(), None);
    }

    #[test]
    fn comparison_operands_fold() {
        let layout = ScoringLayout {
            cmp_sites: 2,
            ..ScoringLayout::default()
        };
        let mut region = vec![0u8; layout.size()];
        layout.record_cmp(&mut region, 1, 0xff00, 0x00ff);
        assert_eq!(layout.cmp_slot(&region, 1), 0xffff);
        layout.record_cmp(&mut region, 3, 0x0f0f, 0);
        assert_eq!(layout.cmp_slot(&region, 1), 0xf0f0);
        assert_eq!(layout.cmp_slot(&region, 0), 0);
        // fitness fields untouched
        assert_eq!(layout.snapshot(&region).count, 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "scoring region of 8 bytes, layout needs 16")]
    fn short_region_is_rejected() {
        let layout = layout(WordSize::W8, FitnessEncoding::Double);
        let mut region = vec![0u8; 8];
        layout.record(&mut region, 1.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "scoring region")]
    fn cmp_table_needs_its_slots() {
        let layout = ScoringLayout {
            cmp_sites: 4,
            ..ScoringLayout::default()
        };
        let region = vec![0u8; layout.cmp_offset() + 8];
        layout.cmp_slot(&region, 3);
    }

    #[test]
    fn edge_counter_uses_previous_location() {
        let mut map = CoverageMap::new(ScoringLayout::default());
        map.visit(0x1234, None);
        map.visit(0x0042, Some(2.0));

        assert_eq!(map.edges()[0x1234], 1);
        assert_eq!(map.edges()[(0x1234 >> 1) ^ 0x0042], 1);
        let snapshot = map.snapshot();
        assert_eq!(snapshot.fitness, 2.0);
        assert_eq!(snapshot.count, 1);

        map.reset();
        assert!(map.edges().iter().all(|&b| b == 0));
        assert_eq!(map.snapshot().count, 0);
    }

    #[test]
    fn word_size_and_encoding_from_str() {
        assert_eq!("4".parse::<WordSize>(), Ok(WordSize::W4));
        assert!("16".parse::<WordSize>().is_err());
        assert_eq!("Integer".parse::<FitnessEncoding>(), Ok(FitnessEncoding::Integer));
        assert!("bcd".parse::<FitnessEncoding>().is_err());
    }
}
