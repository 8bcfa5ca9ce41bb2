// THEORY:
// The SRS microscope records its channels interleaved: for every z position it
// writes one plane per Raman band before moving on. A raw stack of `z * c`
// planes is therefore `(z, c, y, x)` in memory order, and splitting it into
// channels means taking every `c`-th plane starting at the channel's offset.

use crate::core_modules::stack::{Hyperstack, Stack};
use crate::error::{Error, Result};

pub const DEFAULT_CHANNELS: usize = 2;

/// Splits an interleaved `(z*c, y, x)` stack into a `(c, z, y, x)` hyperstack.
pub fn hyperstack_srs(stack: &Stack, num_chn: usize) -> Result<Hyperstack> {
    if num_chn == 0 || stack.len() % num_chn != 0 {
        return Err(Error::ChannelMismatch {
            planes: stack.len(),
            channels: num_chn,
        });
    }

    let channels = (0..num_chn)
        .map(|c| Stack {
            width: stack.width,
            height: stack.height,
            planes: stack.planes.iter().skip(c).step_by(num_chn).cloned().collect(),
        })
        .collect();

    Hyperstack::new(channels)
}
