use std::cmp::Ordering;

/// Half a byte, always in `0..16`.
pub type Nibble = u8;

/// Splits bytes into nibbles, high half first.
pub fn rip(bytes: &[u8]) -> Vec<Nibble> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(b >> 4);
        out.push(b & 0x0f);
    }
    out
}

/// Inverse of `rip`. A trailing odd nibble becomes the high half of a byte.
pub fn stitch(nibbles: &[Nibble]) -> Vec<u8> {
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

pub fn common_prefix(a: &[Nibble], b: &[Nibble]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Compares the overlapping head of two sequences.
pub(crate) fn compare_heads(a: &[Nibble], b: &[Nibble]) -> Ordering {
    let m = a.len().min(b.len());
    a[..m].cmp(&b[..m])
}

/// Inclusive/exclusive key bounds expressed in nibbles.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bounds {
    pub min: Option<Vec<Nibble>>,
    pub max: Option<Vec<Nibble>>,
    pub min_inc: bool,
    pub max_inc: bool,
}

impl Bounds {
    pub fn new(min: Option<&[u8]>, max: Option<&[u8]>, min_inc: bool, max_inc: bool) -> Self {
        Self {
            min: min.map(rip),
            max: max.map(rip),
            min_inc,
            max_inc,
        }
    }

    pub fn contains(&self, key: &[Nibble]) -> bool {
        let above_min = match &self.min {
            Some(min) => match key.cmp(min.as_slice()) {
                Ordering::Greater => true,
                Ordering::Equal => self.min_inc,
                Ordering::Less => false,
            },
            None => true,
        };
        let below_max = match &self.max {
            Some(max) => match key.cmp(max.as_slice()) {
                Ordering::Less => true,
                Ordering::Equal => self.max_inc,
                Ordering::Greater => false,
            },
            None => true,
        };
        above_min && below_max
    }

    /// No key starting with `prefix` can be inside the bounds.
    pub fn excludes_subtree(&self, prefix: &[Nibble]) -> bool {
        if let Some(min) = &self.min
            && compare_heads(prefix, min) == Ordering::Less
        {
            return true;
        }
        if let Some(max) = &self.max {
            match compare_heads(prefix, max) {
                Ordering::Greater => return true,
                Ordering::Equal if prefix.len() > max.len() => return true,
                _ => {}
            }
        }
        false
    }

    /// Every key starting with `prefix` is inside the bounds.
    pub fn covers_subtree(&self, prefix: &[Nibble]) -> bool {
        let above_min = match &self.min {
            Some(min) => match compare_heads(prefix, min) {
                Ordering::Greater => true,
                Ordering::Equal => {
                    prefix.len() > min.len() || (prefix.len() == min.len() && self.min_inc)
                }
                Ordering::Less => false,
            },
            None => true,
        };
        let below_max = match &self.max {
            Some(max) => compare_heads(prefix, max) == Ordering::Less,
            None => true,
        };
        above_min && below_max
    }
}
