use pano_core::KeyPoint;

/// A fixed-length binary feature signature attached to one keypoint.
/// Compared by Hamming distance; never mutated after creation.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub bits: Vec<u8>,
    pub keypoint: KeyPoint,
}

impl Descriptor {
    pub fn new(bits: Vec<u8>, keypoint: KeyPoint) -> Self {
        Self { bits, keypoint }
    }

    pub fn len_bits(&self) -> usize {
        self.bits.len() * 8
    }

    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Descriptors {
    pub descriptors: Vec<Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descriptors.push(desc);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    /// Keypoint location of descriptor `idx`.
    pub fn point(&self, idx: usize) -> (f64, f64) {
        let kp = &self.descriptors[idx].keypoint;
        (kp.x, kp.y)
    }
}
