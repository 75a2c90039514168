/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Maps an ordered cluster vector to a per-COS cache-way bitmask vector.

use crate::cache::CacheInfo;
use crate::clustering::Cluster;
use crate::error::DistributorError;

/// One of the seven named curves used by the parametric model to map a
/// normalized badness `x ∈ [0,1]` to a normalized way fraction in `[0,1]`.
/// Each variant satisfies `f(0) = 0` and `f(1) = 1` before the caller
/// rescales into `[min_cbm_bits, max_ways]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParametricModel {
    Linear,
    Quadratic,
    Exponential,
    ExpQuad,
    Log,
    LinLog,
    Camel,
}

impl ParametricModel {
    pub fn parse(name: &str) -> Result<Self, DistributorError> {
        match name {
            "linear" => Ok(ParametricModel::Linear),
            "quadratic" => Ok(ParametricModel::Quadratic),
            "exponential" => Ok(ParametricModel::Exponential),
            "expquad" => Ok(ParametricModel::ExpQuad),
            "log" => Ok(ParametricModel::Log),
            "linlog" => Ok(ParametricModel::LinLog),
            "camel" => Ok(ParametricModel::Camel),
            other => Err(DistributorError::InvalidConfig(other.to_string())),
        }
    }

    /// Evaluate the curve at `x`, clamped to `[0, 1]`. Always returns a
    /// value in `[0, 1]`.
    pub fn eval(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            ParametricModel::Linear => x,
            ParametricModel::Quadratic => x * x,
            ParametricModel::Exponential => {
                let a = (2.0f64).ln();
                (a * x).exp() - 1.0
            }
            ParametricModel::ExpQuad => {
                let a = (2.0f64).ln();
                (a * x * x).exp() - 1.0
            }
            ParametricModel::Log => {
                let a = std::f64::consts::E - 1.0;
                (a * x + 1.0).ln()
            }
            ParametricModel::LinLog => {
                let a = std::f64::consts::E - 1.0;
                let base = a * x + 1.0;
                x * base.ln()
            }
            ParametricModel::Camel => {
                // Native domain is 0..100; raw(0) and raw(100) anchor the
                // renormalization to [0, 1].
                let raw = |t: f64| (0.9 * t - 25.0) * (0.1 * t).exp() + 0.005 * (t + 40.0).powi(2) + t + 24.0;
                let t = x * 100.0;
                let r0 = raw(0.0);
                let r100 = raw(100.0);
                (raw(t) - r0) / (r100 - r0)
            }
        }
    }
}

/// Maps clusters (ordered descending by badness) to per-COS way masks.
pub enum WayDistributor {
    /// Fixed mask list from configuration, masked with `cbm_mask` as-is.
    Static { masks: Vec<u64> },
    /// Top `n` clusters get `min_cbm_bits` ways, high-order anchored; the
    /// rest (and COS 0) get the full mask.
    DivideN { n: usize },
    /// Parametric model scaling cluster centroids into way counts.
    Parametric {
        model: ParametricModel,
        alternate_sides: bool,
    },
}

fn full_mask(info: &CacheInfo) -> u64 {
    info.cbm_mask
}

fn low_anchored_mask(ways: u32) -> u64 {
    if ways == 0 {
        0
    } else {
        (1u64 << ways) - 1
    }
}

fn high_anchored_mask(ways: u32, info: &CacheInfo) -> u64 {
    let total_ways = info.cbm_mask.count_ones();
    if ways >= total_ways {
        info.cbm_mask
    } else {
        low_anchored_mask(ways) << (total_ways - ways)
    }
}

impl WayDistributor {
    /// Produce one mask per `max_cos` slot. Slots beyond the cluster count
    /// receive the full mask.
    pub fn distribute(
        &self,
        clusters: &[Cluster],
        info: &CacheInfo,
    ) -> Result<Vec<u64>, DistributorError> {
        let max_cos = info.num_closids;
        if clusters.len() > max_cos {
            return Err(DistributorError::TooManyClusters {
                clusters: clusters.len(),
                max_cos,
            });
        }

        let mut masks = vec![full_mask(info); max_cos];

        match self {
            WayDistributor::Static { masks: configured } => {
                for (i, m) in configured.iter().enumerate().take(max_cos) {
                    masks[i] = m & info.cbm_mask;
                }
            }
            WayDistributor::DivideN { n } => {
                let total_ways = info.cbm_mask.count_ones();
                let n = (*n).min(clusters.len());
                for i in 0..n {
                    masks[i] = high_anchored_mask(info.min_cbm_bits.min(total_ways), info);
                }
            }
            WayDistributor::Parametric {
                model,
                alternate_sides,
            } => {
                if let Some(v0) = clusters.first().map(|c| c.centroid[0]) {
                    let total_ways = info.cbm_mask.count_ones();
                    for (i, c) in clusters.iter().enumerate() {
                        let x = if v0 == 0.0 { 0.0 } else { c.centroid[0] / v0 };
                        let f = model.eval(x);
                        let ways_f = info.min_cbm_bits as f64
                            + f * (total_ways as f64 - info.min_cbm_bits as f64);
                        let ways = (ways_f.round() as u32)
                            .clamp(info.min_cbm_bits, total_ways);
                        masks[i] = if *alternate_sides && i % 2 == 1 {
                            high_anchored_mask(ways, info)
                        } else {
                            low_anchored_mask(ways)
                        };
                    }
                }
            }
        }

        Ok(masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(cbm_mask: u64, min_cbm_bits: u32, num_closids: usize) -> CacheInfo {
        CacheInfo {
            cbm_mask,
            min_cbm_bits,
            num_closids,
        }
    }

    fn cluster(id: usize, centroid: f64) -> Cluster {
        Cluster {
            id,
            centroid: vec![centroid],
            members: vec![id as u64],
        }
    }

    #[test]
    fn static_distributor_returns_configured_masks_as_is() {
        let d = WayDistributor::Static {
            masks: vec![0x1, 0xF, 0xFF, 0xFFFFF],
        };
        let masks = d.distribute(&[], &info(0xFFFFF, 2, 4)).unwrap();
        assert_eq!(masks, vec![0x1, 0xF, 0xFF, 0xFFFFF]);
    }

    #[test]
    fn static_distributor_masks_with_cbm_mask() {
        let d = WayDistributor::Static {
            masks: vec![0x1FFFFF], // one bit beyond cbm_mask
        };
        let masks = d.distribute(&[], &info(0xFFFFF, 2, 4)).unwrap();
        assert_eq!(masks[0], 0xFFFFF);
    }

    #[test]
    fn parametric_linear_model_matches_the_worked_example() {
        // centroids (1.0, 0.5, 0.1), min=2, max_ways=20 -> ways (20, 11, 4)
        let clusters = vec![cluster(0, 1.0), cluster(1, 0.5), cluster(2, 0.1)];
        let d = WayDistributor::Parametric {
            model: ParametricModel::Linear,
            alternate_sides: false,
        };
        let masks = d.distribute(&clusters, &info(0xFFFFF, 2, 20)).unwrap();
        assert_eq!(masks[0], 0xFFFFF);
        assert_eq!(masks[0].count_ones(), 20);
        assert_eq!(masks[1], 0x007FF);
        assert_eq!(masks[1].count_ones(), 11);
        assert_eq!(masks[2], 0x0000F);
        assert_eq!(masks[2].count_ones(), 4);
    }

    #[test]
    fn parametric_model_bounds_ways_between_min_and_max() {
        let clusters = vec![cluster(0, 1.0), cluster(1, 0.0)];
        for model in [
            ParametricModel::Linear,
            ParametricModel::Quadratic,
            ParametricModel::Exponential,
            ParametricModel::ExpQuad,
            ParametricModel::Log,
            ParametricModel::LinLog,
            ParametricModel::Camel,
        ] {
            let d = WayDistributor::Parametric {
                model,
                alternate_sides: false,
            };
            let masks = d.distribute(&clusters, &info(0xFFFFF, 2, 20)).unwrap();
            assert!(masks[0].count_ones() >= 2 && masks[0].count_ones() <= 20);
            assert!(masks[1].count_ones() >= 2 && masks[1].count_ones() <= 20);
            assert!(masks[0] & !0xFFFFF == 0);
        }
    }

    #[test]
    fn every_named_model_satisfies_f_of_zero_and_f_of_one() {
        for model in [
            ParametricModel::Linear,
            ParametricModel::Quadratic,
            ParametricModel::Exponential,
            ParametricModel::ExpQuad,
            ParametricModel::Log,
            ParametricModel::LinLog,
            ParametricModel::Camel,
        ] {
            assert!(model.eval(0.0).abs() < 1e-9, "{model:?} f(0) != 0");
            assert!((model.eval(1.0) - 1.0).abs() < 1e-9, "{model:?} f(1) != 1");
        }
    }

    #[test]
    fn slots_without_a_cluster_receive_the_full_mask() {
        let clusters = vec![cluster(0, 1.0)];
        let d = WayDistributor::Parametric {
            model: ParametricModel::Linear,
            alternate_sides: false,
        };
        let masks = d.distribute(&clusters, &info(0xFFFFF, 2, 4)).unwrap();
        assert_eq!(masks[1], 0xFFFFF);
        assert_eq!(masks[2], 0xFFFFF);
        assert_eq!(masks[3], 0xFFFFF);
    }

    #[test]
    fn alternate_sides_anchors_odd_indexed_clusters_high() {
        let clusters = vec![cluster(0, 1.0), cluster(1, 1.0)];
        let d = WayDistributor::Parametric {
            model: ParametricModel::Linear,
            alternate_sides: true,
        };
        let masks = d.distribute(&clusters, &info(0xFFFFF, 2, 4)).unwrap();
        assert_eq!(masks[0], 0xFFFFF); // low-anchored, full width
        assert_eq!(masks[1], 0xFFFFF); // also full width here since ways==total
    }

    #[test]
    fn alternate_sides_anchors_partial_mask_to_high_bits() {
        let clusters = vec![cluster(0, 1.0), cluster(1, 0.1)];
        let d = WayDistributor::Parametric {
            model: ParametricModel::Linear,
            alternate_sides: true,
        };
        let masks = d.distribute(&clusters, &info(0xFFFFF, 2, 4)).unwrap();
        // cluster 1 (odd index) gets a partial mask anchored to the high bits
        assert_eq!(masks[1].trailing_zeros() as u32, 20 - masks[1].count_ones());
    }

    #[test]
    fn too_many_clusters_for_max_cos_is_rejected() {
        let clusters = vec![cluster(0, 1.0), cluster(1, 0.5), cluster(2, 0.1)];
        let d = WayDistributor::Static { masks: vec![] };
        let err = d.distribute(&clusters, &info(0xFFFFF, 2, 2)).unwrap_err();
        assert!(matches!(
            err,
            DistributorError::TooManyClusters {
                clusters: 3,
                max_cos: 2
            }
        ));
    }

    #[test]
    fn parametric_model_parse_rejects_unknown_name() {
        assert!(matches!(
            ParametricModel::parse("bogus"),
            Err(DistributorError::InvalidConfig(_))
        ));
    }
}
