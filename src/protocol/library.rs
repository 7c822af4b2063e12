//! Built-in protocol library

use super::phase::{FrequencySpec, Phase, Protocol};
use crate::error::Result;

/// Identifiers of the built-in protocols
pub const BUILTIN_IDS: [&str; 5] = [
    "deep-focus",
    "calm-alpha",
    "sleep-descent",
    "gamma-burst",
    "meditation-theta",
];

/// Build every built-in protocol
pub fn builtin_protocols() -> Result<Vec<Protocol>> {
    Ok(vec![
        deep_focus()?,
        calm_alpha()?,
        sleep_descent()?,
        gamma_burst()?,
        meditation_theta()?,
    ])
}

fn deep_focus() -> Result<Protocol> {
    Ok(Protocol::new(
        "deep-focus",
        "Deep Focus",
        1500.0,
        vec![
            Phase::new("Settle", 0.2, FrequencySpec::Sweep { start: 10.0, end: 14.0 })
                .with_intensity(0.4),
            Phase::new("Engage", 0.6, FrequencySpec::Constant { hz: 16.0 }).with_intensity(0.7),
            Phase::new(
                "Release",
                0.2,
                FrequencySpec::ThreePoint { start: 16.0, mid: 12.0, end: 10.0 },
            )
            .with_intensity(0.4),
        ],
    )?
    .with_description("Low-beta plateau for sustained concentration"))
}

fn calm_alpha() -> Result<Protocol> {
    Ok(Protocol::new(
        "calm-alpha",
        "Calm Alpha",
        900.0,
        vec![
            Phase::new("Unwind", 0.3, FrequencySpec::Sweep { start: 14.0, end: 10.0 })
                .with_intensity(0.5),
            Phase::new("Rest", 0.7, FrequencySpec::Constant { hz: 10.0 }).with_intensity(0.6),
        ],
    )?
    .with_description("Relaxed alpha state"))
}

fn sleep_descent() -> Result<Protocol> {
    Ok(Protocol::new(
        "sleep-descent",
        "Sleep Descent",
        2400.0,
        vec![
            Phase::new("Wind Down", 0.25, FrequencySpec::Sweep { start: 10.0, end: 6.0 })
                .with_intensity(0.5),
            Phase::new("Drift", 0.35, FrequencySpec::Sweep { start: 6.0, end: 3.0 })
                .with_intensity(0.6),
            Phase::new("Deep", 0.4, FrequencySpec::Constant { hz: 1.5 }).with_intensity(0.8),
        ],
    )?
    .with_description("Gradual descent from alpha to delta"))
}

fn gamma_burst() -> Result<Protocol> {
    Ok(Protocol::new(
        "gamma-burst",
        "Gamma Burst",
        600.0,
        vec![
            Phase::new("Prime", 0.25, FrequencySpec::Sweep { start: 14.0, end: 30.0 })
                .with_intensity(0.5),
            Phase::new("Burst", 0.5, FrequencySpec::Constant { hz: 40.0 }).with_intensity(0.9),
            Phase::new("Return", 0.25, FrequencySpec::Sweep { start: 40.0, end: 12.0 })
                .with_intensity(0.4),
        ],
    )?
    .with_description("Short high-gamma session"))
}

fn meditation_theta() -> Result<Protocol> {
    Ok(Protocol::new(
        "meditation-theta",
        "Meditation Theta",
        1200.0,
        vec![
            Phase::new("Arrive", 0.2, FrequencySpec::Sweep { start: 10.0, end: 7.0 })
                .with_intensity(0.4),
            Phase::new(
                "Wave",
                0.6,
                FrequencySpec::ThreePoint { start: 7.0, mid: 4.5, end: 6.0 },
            )
            .with_intensity(0.7),
            Phase::new("Surface", 0.2, FrequencySpec::Sweep { start: 6.0, end: 10.0 })
                .with_intensity(0.4),
        ],
    )?
    .with_description("Theta oscillation for meditation"))
}
