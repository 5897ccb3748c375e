use can_core::CanError;
use crate::constants::{BITRATE_TOLERANCE_PPM, SAMPLE_POINT_PERMILLE};
use crate::protocol::{BitTiming, BitTimingConsts};

/// A candidate of the prescaler search, ordered by bitrate error then sample point error.
#[derive(Debug, Copy, Clone)]
struct Candidate {
    timing: BitTiming,
    error_ppm: u64,
    sample_error: u64,
}

impl Candidate {
    #[inline]
    fn key(&self) -> (u64, u64) {
        (self.error_ppm, self.sample_error)
    }
}

/// Split `tq` time quanta into `1 + tseg1 + tseg2` aiming for the target sample point.
fn split_quanta(consts: &BitTimingConsts, tq: u64) -> Option<(u32, u32)> {
    let (tseg1_min, tseg1_max) = (consts.tseg1_min as u64, consts.tseg1_max as u64);
    let (tseg2_min, tseg2_max) = (consts.tseg2_min as u64, consts.tseg2_max as u64);

    let sample = (tq * SAMPLE_POINT_PERMILLE as u64 + 500) / 1000;
    let mut tseg2 = tq.saturating_sub(sample).clamp(tseg2_min, tseg2_max);
    let mut tseg1 = tq.checked_sub(1 + tseg2)?;

    if tseg1 > tseg1_max {
        tseg1 = tseg1_max;
        tseg2 = tq - 1 - tseg1;
    }
    else if tseg1 < tseg1_min {
        tseg1 = tseg1_min;
        tseg2 = tq.checked_sub(1 + tseg1)?;
    }

    if (tseg2_min..=tseg2_max).contains(&tseg2) {
        Some((u32::try_from(tseg1).ok()?, u32::try_from(tseg2).ok()?))
    }
    else {
        None
    }
}

impl BitTiming {
    /// Find the bit timing of `bitrate` for a controller with the given limits.
    ///
    /// An exact bitrate is preferred, otherwise the closest within 0.5%.
    /// Among equal bitrate errors the sample point closest to 87.5% wins,
    /// ties keep the smaller prescaler.
    pub fn calculate(consts: &BitTimingConsts, bitrate: u32) -> Result<Self, CanError> {
        consts.validate()?;
        if bitrate == 0 {
            return Err(CanError::InvalidBitrate(bitrate));
        }

        let fclk = consts.fclk_can as u64;
        let min_tq = 1 + consts.tseg1_min as u64 + consts.tseg2_min as u64;
        let max_tq = 1 + consts.tseg1_max as u64 + consts.tseg2_max as u64;

        let mut best: Option<Candidate> = None;
        for brp in (consts.brp_min..=consts.brp_max).step_by(consts.brp_inc as usize) {
            let divisor = brp as u64 * bitrate as u64;
            let tq = (fclk + divisor / 2) / divisor;
            if tq < min_tq || tq > max_tq {
                continue;
            }
            let Some((tseg1, tseg2)) = split_quanta(consts, tq) else {
                continue;
            };

            let nominal = divisor * tq;
            let error_ppm = fclk.abs_diff(nominal) * 1_000_000 / nominal;
            let sample_point = (1 + tseg1 as u64) * 1000 / tq;
            let candidate = Candidate {
                timing: BitTiming {
                    prop_seg: 0,
                    phase_seg1: tseg1,
                    phase_seg2: tseg2,
                    sjw: consts.sjw_max.min(tseg2),
                    brp,
                },
                error_ppm,
                sample_error: sample_point.abs_diff(SAMPLE_POINT_PERMILLE as u64),
            };

            if error_ppm <= BITRATE_TOLERANCE_PPM
                && best.map_or(true, |b| candidate.key() < b.key()) {
                best = Some(candidate);
            }
        }

        match best {
            Some(c) => {
                log::debug!("CANTACT - bitrate: {} timing: {:?} error: {}ppm", bitrate, c.timing, c.error_ppm);
                Ok(c.timing)
            },
            None => Err(CanError::InvalidBitrate(bitrate)),
        }
    }
}
