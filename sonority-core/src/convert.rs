//! Adapting the mixed chunk to the device layout.

/// Rewrites a mixed chunk into the layout the device expects.
pub trait FormatConverter: Send {
    /// Convert `input` and replace the contents of `output` with the result.
    fn convert(&mut self, input: &[i16], output: &mut Vec<i16>);

    /// True when `convert` would copy its input unchanged.
    fn is_identity(&self) -> bool;
}

/// Channel-count adaptation. Upmixing repeats input channels round-robin,
/// downmixing averages the input channels folded onto each output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConverter {
    from: u16,
    to: u16,
}

impl ChannelConverter {
    pub fn new(from: u16, to: u16) -> Self {
        Self {
            from: from.max(1),
            to: to.max(1),
        }
    }
}

impl FormatConverter for ChannelConverter {
    fn convert(&mut self, input: &[i16], output: &mut Vec<i16>) {
        output.clear();
        if self.is_identity() {
            output.extend_from_slice(input);
            return;
        }

        let from = self.from as usize;
        let to = self.to as usize;
        let frames = input.len() / from;
        output.reserve(frames * to);
        for frame in input.chunks_exact(from) {
            if to > from {
                output.extend((0..to).map(|c| frame[c % from]));
            } else {
                output.extend((0..to).map(|c| {
                    let (sum, count) = frame
                        .iter()
                        .skip(c)
                        .step_by(to)
                        .fold((0i32, 0i32), |(sum, count), &s| (sum + i32::from(s), count + 1));
                    (sum / count.max(1)) as i16
                }));
            }
        }
    }

    fn is_identity(&self) -> bool {
        self.from == self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copies() {
        let mut converter = ChannelConverter::new(2, 2);
        let mut out = Vec::new();
        converter.convert(&[1, 2, 3, 4], &mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mono_to_stereo() {
        let mut converter = ChannelConverter::new(1, 2);
        let mut out = Vec::new();
        converter.convert(&[1, 2, 3], &mut out);
        assert_eq!(out, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mut converter = ChannelConverter::new(2, 1);
        let mut out = vec![99];
        converter.convert(&[10, 20, i16::MAX, i16::MAX], &mut out);
        assert_eq!(out, vec![15, i16::MAX]);
    }
}
