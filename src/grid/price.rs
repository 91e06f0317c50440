//! Price-level keys and band arithmetic
//!
//! All grid prices are integer ticks so that a level is addressable by
//! exact equality; floating point only appears at the venue boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::GridConfig;
use super::types::PositionSide;

/// A grid price level in integer ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceKey(pub i64);

impl PriceKey {
    pub fn offset(self, ticks: i64) -> Self {
        PriceKey(self.0 + ticks)
    }

    /// Absolute tick distance between two levels
    pub fn distance(self, other: PriceKey) -> i64 {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference levels derived from the current price
///
/// `fix_long = floor(price / interval) * interval`, `fix_short = fix_long + interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bands {
    pub fix_long: PriceKey,
    pub fix_short: PriceKey,
    /// Interval in ticks
    pub interval: i64,
    /// Window size N
    pub window: i64,
}

impl Bands {
    /// Bucket `price` onto the interval grid
    pub fn from_price(price: f64, config: &GridConfig) -> Self {
        Self::from_key(config.precision.floor_key(price), config)
    }

    pub fn from_key(price: PriceKey, config: &GridConfig) -> Self {
        let interval = config.interval_ticks().max(1);
        let fix_long = PriceKey(price.0.div_euclid(interval) * interval);
        Self {
            fix_long,
            fix_short: fix_long.offset(interval),
            interval,
            window: config.window as i64,
        }
    }

    /// Band level on `side`
    pub fn fix(&self, side: PositionSide) -> PriceKey {
        match side {
            PositionSide::Long => self.fix_long,
            PositionSide::Short => self.fix_short,
        }
    }

    /// Direction "away from the market" for entries on `side`
    fn outward(side: PositionSide) -> i64 {
        match side {
            PositionSide::Long => -1,
            PositionSide::Short => 1,
        }
    }

    /// Candidate entry price for window level `i`
    pub fn entry_level(&self, side: PositionSide, i: u32) -> PriceKey {
        self.fix(side)
            .offset(Self::outward(side) * self.interval * i as i64)
    }

    /// Take-profit ladder price for level `i`, placed beyond the entry window
    pub fn tp_level(&self, side: PositionSide, i: u32) -> PriceKey {
        self.fix(side)
            .offset(-Self::outward(side) * self.interval * (self.window + i as i64))
    }

    /// Ledger key a take-profit at `tp` attaches to: the entry level it closes
    pub fn tp_attach_key(&self, side: PositionSide, tp: PriceKey) -> PriceKey {
        tp.offset(Self::outward(side) * self.interval)
    }

    /// Ideal take-profit for an entry at `entry`
    ///
    /// Long: `max(fix_long, entry) + interval`; short: `min(fix_short, entry) - interval`.
    pub fn desired_tp(&self, side: PositionSide, entry: PriceKey) -> PriceKey {
        match side {
            PositionSide::Long => self.fix_long.max(entry).offset(self.interval),
            PositionSide::Short => self.fix_short.min(entry).offset(-self.interval),
        }
    }

    /// Tick distance beyond which resting orders are pruned
    pub fn prune_threshold(&self) -> i64 {
        self.interval * 2 * self.window
    }

    /// Entry order too far from the band, away from the market
    pub fn entry_out_of_band(&self, side: PositionSide, price: PriceKey) -> bool {
        match side {
            PositionSide::Long => price.0 < self.fix_long.0 - self.prune_threshold(),
            PositionSide::Short => price.0 > self.fix_short.0 + self.prune_threshold(),
        }
    }

    /// Take-profit too far from the band, on the profit side
    pub fn tp_out_of_band(&self, side: PositionSide, price: PriceKey) -> bool {
        match side {
            PositionSide::Long => price.0 > self.fix_long.0 + self.prune_threshold(),
            PositionSide::Short => price.0 < self.fix_short.0 - self.prune_threshold(),
        }
    }

    /// Entry candidate within half an interval of the market (or crossing it)
    pub fn too_close_to_market(&self, side: PositionSide, candidate: PriceKey, market: PriceKey) -> bool {
        let gap = match side {
            PositionSide::Long => market.0 - candidate.0,
            PositionSide::Short => candidate.0 - market.0,
        };
        2 * gap < self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::config::AssetPrecision;

    fn eth_config() -> GridConfig {
        GridConfig::new("ETH-USD", 0.1)
            .with_interval(5.0)
            .with_levels(3, 3)
    }

    #[test]
    fn test_band_bounds_sweep() {
        let config = eth_config();
        let precision = config.precision;
        for cents in (390_000i64..410_000).step_by(7) {
            let price = cents as f64 / 100.0;
            let bands = Bands::from_price(price, &config);
            let low = precision.price(bands.fix_long);
            let high = low + config.interval;
            assert!(low <= price + 1e-9, "{} below band {}", price, low);
            assert!(price < high, "{} not under {}", price, high);
            assert_eq!(bands.fix_short, bands.fix_long.offset(bands.interval));
        }
    }

    #[test]
    fn test_band_on_exact_level() {
        let config = GridConfig::new("SOL-USD", 1.0);
        let bands = Bands::from_price(200.25, &config);
        assert_eq!(bands.fix_long, PriceKey(20025));
        let bands = Bands::from_price(0.1 + 0.2, &GridConfig::new("X", 1.0));
        assert_eq!(bands.fix_long, PriceKey(30));
    }

    #[test]
    fn test_key_stability_under_reformatting() {
        for decimals in 0..6u32 {
            let precision = AssetPrecision::new(decimals, 3);
            for ticks in (0i64..200_000).step_by(13) {
                let key = PriceKey(ticks);
                let mut price = precision.price(key);
                for _ in 0..3 {
                    let text = precision.format_price(price);
                    price = text.parse::<f64>().unwrap();
                    assert_eq!(precision.key(price), key, "decimals {} text {}", decimals, text);
                }
            }
        }
    }

    #[test]
    fn test_long_entry_candidates() {
        let config = eth_config();
        let bands = Bands::from_price(4000.0, &config);
        let prices: Vec<f64> = (0..3)
            .map(|i| config.precision.price(bands.entry_level(PositionSide::Long, i)))
            .collect();
        assert_eq!(prices, vec![4000.0, 3995.0, 3990.0]);

        let market = config.precision.key(4000.0);
        assert!(bands.too_close_to_market(PositionSide::Long, bands.entry_level(PositionSide::Long, 0), market));
        assert!(!bands.too_close_to_market(PositionSide::Long, bands.entry_level(PositionSide::Long, 1), market));
    }

    #[test]
    fn test_short_levels_mirror_long() {
        let config = eth_config();
        let bands = Bands::from_price(4001.0, &config);
        assert_eq!(bands.entry_level(PositionSide::Short, 0), PriceKey(400_500));
        assert_eq!(bands.entry_level(PositionSide::Short, 2), PriceKey(401_500));
        // beyond the window of 3: fix_short - 5 * (3 + i)
        assert_eq!(bands.tp_level(PositionSide::Short, 0), PriceKey(399_000));
        assert_eq!(bands.tp_attach_key(PositionSide::Short, PriceKey(399_000)), PriceKey(399_500));
        assert_eq!(bands.tp_level(PositionSide::Long, 1), PriceKey(402_000));
        assert_eq!(bands.tp_attach_key(PositionSide::Long, PriceKey(402_000)), PriceKey(401_500));
    }

    #[test]
    fn test_desired_tp() {
        let config = eth_config();
        let bands = Bands::from_price(4012.0, &config);
        // entry below the band: tp follows the band
        assert_eq!(bands.desired_tp(PositionSide::Long, PriceKey(399_000)), PriceKey(401_500));
        // entry above the band: tp follows the entry
        assert_eq!(bands.desired_tp(PositionSide::Long, PriceKey(402_000)), PriceKey(402_500));
        assert_eq!(bands.desired_tp(PositionSide::Short, PriceKey(403_000)), PriceKey(401_000));
        assert_eq!(bands.desired_tp(PositionSide::Short, PriceKey(400_000)), PriceKey(399_500));
    }

    #[test]
    fn test_prune_boundaries() {
        let config = eth_config();
        let bands = Bands::from_price(4000.0, &config);
        // threshold = 5 * 2 * 3 = 30
        assert!(!bands.entry_out_of_band(PositionSide::Long, PriceKey(397_000)));
        assert!(bands.entry_out_of_band(PositionSide::Long, PriceKey(396_995)));
        assert!(bands.tp_out_of_band(PositionSide::Long, PriceKey(403_005)));
        assert!(!bands.tp_out_of_band(PositionSide::Long, PriceKey(403_000)));
        assert!(bands.entry_out_of_band(PositionSide::Short, PriceKey(403_505)));
        assert!(bands.tp_out_of_band(PositionSide::Short, PriceKey(397_495)));
    }
}
