// THEORY:
// In the two-band SRS setup channel 0 is the protein band and channel 1 the
// lipid band. The protein band also picks up lipid signal, so a cleaner protein
// image is `protein - ratio * lipid`. Unless the caller fixes the ratio, it is
// estimated so that both bands agree at a high intensity quantile (0.999 by
// default, which ignores a handful of saturated pixels). Negative differences
// are clamped to zero.
//
// The output hyperstack has three channels in a fixed order: protein, scaled
// lipid, protein minus lipid. All three are cast back to 16 bits.

use crate::core_modules::field_norm::saturate_u16;
use crate::core_modules::stack::{Hyperstack, Stack};
use crate::error::{Error, Result};
use tracing::debug;

pub const DEFAULT_QUANTILE: f64 = 0.999;

/// Quantile of all samples in `stack` with linear interpolation between ranks.
pub fn quantile(stack: &Stack, q: f64) -> Option<f64> {
    let mut values: Vec<u16> = stack.planes.iter().flatten().copied().collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    let (a, b) = (values[lo] as f64, values[hi] as f64);
    Some(a + (b - a) * frac)
}

/// Protein/lipid ratio matching the two channels at quantile `q`.
pub fn channel_ratio(protein: &Stack, lipid: &Stack, q: f64) -> Result<f64> {
    let pro_q = quantile(protein, q).ok_or(Error::DegenerateRatio)?;
    let lip_q = quantile(lipid, q).ok_or(Error::DegenerateRatio)?;
    if lip_q == 0.0 {
        return Err(Error::DegenerateRatio);
    }
    Ok(pro_q / lip_q)
}

/// Returns `[protein, lipid * ratio, max(protein - lipid * ratio, 0)]`.
pub fn pro_sub_lip(hyperstack: &Hyperstack, ratio: Option<f64>, q: f64) -> Result<Hyperstack> {
    if hyperstack.num_channels() < 2 {
        return Err(Error::ChannelMismatch {
            planes: hyperstack.num_slices(),
            channels: hyperstack.num_channels(),
        });
    }
    let protein = &hyperstack.channels[0];
    let lipid = &hyperstack.channels[1];

    let ratio = match ratio {
        Some(r) => r,
        None => channel_ratio(protein, lipid, q)?,
    };
    debug!(ratio, quantile = q, "unmixing protein and lipid channels");

    let mut scaled_lipid = Stack::new(protein.width, protein.height);
    let mut difference = Stack::new(protein.width, protein.height);
    for (pro_plane, lip_plane) in protein.planes.iter().zip(&lipid.planes) {
        let mut lip_out = Vec::with_capacity(pro_plane.len());
        let mut diff_out = Vec::with_capacity(pro_plane.len());
        for (&p, &l) in pro_plane.iter().zip(lip_plane) {
            let lip = l as f64 * ratio;
            lip_out.push(saturate_u16(lip));
            diff_out.push(saturate_u16((p as f64 - lip).max(0.0)));
        }
        scaled_lipid.push(lip_out)?;
        difference.push(diff_out)?;
    }

    Hyperstack::new(vec![protein.clone(), scaled_lipid, difference])
}
