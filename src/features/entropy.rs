//! Shannon entropy over a byte histogram, normalized to [0, 1]. High values
//! on freshly written files are the strongest single signal of encryption.

/// Deterministic: 0.0 for an empty or single-valued buffer, approaching 1.0
/// for uniformly distributed bytes over a large buffer.
pub fn calculate_entropy(buf: &[u8]) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in buf {
        counts[b as usize] += 1;
    }
    let len = buf.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    // 8 bits of entropy per byte is the ceiling
    entropy / 8.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_constant_buffers_have_zero_entropy() {
        assert_eq!(calculate_entropy(&[]), 0.0);
        assert_eq!(calculate_entropy(&[0x41; 4096]), 0.0);
    }

    #[test]
    fn uniform_distribution_approaches_one() {
        let buf: Vec<u8> = (0..=255u8).cycle().take(256 * 64).collect();
        let e = calculate_entropy(&buf);
        assert!(e > 0.999, "uniform bytes should be ~1.0, got {e}");
    }

    #[test]
    fn text_sits_between_constant_and_random() {
        let text = b"the quick brown fox jumps over the lazy dog, repeatedly";
        let e = calculate_entropy(text);
        assert!(e > 0.0 && e < 0.8, "plain text entropy was {e}");
    }

    #[test]
    fn deterministic_for_identical_input() {
        let buf: Vec<u8> = (0..200u8).collect();
        assert_eq!(calculate_entropy(&buf), calculate_entropy(&buf));
    }
}
