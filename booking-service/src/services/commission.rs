//! Commission tier resolver.
//!
//! Platform commission is a step function over the booking's final price.
//! Bands are half-open `[min, max)` in paise: a price sitting exactly on a
//! boundary belongs to the upper band.

/// (min inclusive, max exclusive, percent), in paise.
const BANDS: &[(i64, i64, u32)] = &[
    (0, 80_000, 9),
    (80_000, 90_000, 10),
    (90_000, 100_000, 12),
    (100_000, 120_000, 15),
    (120_000, 140_000, 17),
    (140_000, 160_000, 18),
    (160_000, 180_000, 19),
    (180_000, 200_000, 20),
    (200_000, 220_000, 21),
    (220_000, 240_000, 22),
    (240_000, 260_000, 23),
    (260_000, 280_000, 24),
    (280_000, 300_000, 25),
    (300_000, 350_000, 28),
    (350_000, i64::MAX, 30),
];

/// Commission percentage for a final price. Prices below zero (or otherwise
/// outside every band) resolve to 0.
pub fn commission_percent(final_price_paise: i64) -> u32 {
    BANDS
        .iter()
        .find(|(min, max, _)| final_price_paise >= *min && final_price_paise < *max)
        .map(|(_, _, percent)| *percent)
        .unwrap_or(0)
}

/// Commission amount pre-debited from the partner wallet at assignment.
pub fn commission_amount_paise(final_price_paise: i64) -> i64 {
    final_price_paise * i64::from(commission_percent(final_price_paise)) / 100
}
