//! Configuration validation.
//!
//! Validates all config fields before a backtest runs. Numeric keys that are
//! present but unparsable are rejected rather than silently defaulted.

use crate::domain::error::ChaintraderError;
use crate::domain::feature::parse_timestamp;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_TYPES: [&str; 4] = ["ma_cross", "network_metrics", "signal_column", "zscore"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    validate_symbol(config)?;
    validate_initial_capital(config)?;
    validate_commission_rate(config)?;
    validate_max_position_pct(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_data_source(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let strategy_type = validate_strategy_type(config)?;
    validate_position_size(config)?;
    match strategy_type.as_str() {
        "ma_cross" => validate_windows(config)?,
        "zscore" => validate_zscore(config)?,
        _ => {}
    }
    for key in ["address_threshold", "velocity_threshold", "hash_rate_threshold"] {
        validate_non_negative("strategy", key, number(config, "strategy", key)?)?;
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> ChaintraderError {
    ChaintraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// The key's value as a finite number, `None` if the key is absent.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, ChaintraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(section, key, &format!("{key} must be a number"))),
        },
    }
}

fn validate_non_negative(section: &str, key: &str, value: Option<f64>) -> Result<(), ChaintraderError> {
    match value {
        Some(v) if v < 0.0 => Err(invalid(section, key, &format!("{key} must be non-negative"))),
        _ => Ok(()),
    }
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match config.get_string("backtest", "symbol") {
        Some(s) if s.trim().is_empty() => Err(invalid("backtest", "symbol", "symbol must not be empty")),
        _ => Ok(()),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "backtest", "initial_capital")? {
        None => Err(ChaintraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
        }),
        Some(v) if v <= 0.0 => Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        )),
        Some(_) => Ok(()),
    }
}

fn validate_commission_rate(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "backtest", "commission_rate")? {
        Some(v) if !(0.0..1.0).contains(&v) => Err(invalid(
            "backtest",
            "commission_rate",
            "commission_rate must be in [0, 1)",
        )),
        _ => Ok(()),
    }
}

fn validate_max_position_pct(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "backtest", "max_position_pct")? {
        Some(v) if v <= 0.0 || v > 1.0 => Err(invalid(
            "backtest",
            "max_position_pct",
            "max_position_pct must be in (0, 1]",
        )),
        _ => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "backtest", "risk_free_rate")? {
        Some(v) if !(0.0..1.0).contains(&v) => Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let start = optional_date(config, "start_date")?;
    let end = optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(())
}

fn optional_date(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<chrono::NaiveDateTime>, ChaintraderError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(s) => parse_timestamp(&s).map(Some).ok_or_else(|| {
            invalid(
                "backtest",
                key,
                &format!("invalid {key} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let present = |key: &str| {
        config
            .get_string("backtest", key)
            .is_some_and(|s| !s.trim().is_empty())
    };

    match (present("data_dir"), present("features_path")) {
        (false, false) => Err(ChaintraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_dir".to_string(),
        }),
        (true, true) => Err(invalid(
            "backtest",
            "features_path",
            "set either data_dir or features_path, not both",
        )),
        _ => Ok(()),
    }
}

fn validate_strategy_type(config: &dyn ConfigPort) -> Result<String, ChaintraderError> {
    let name = config
        .get_string("strategy", "type")
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ChaintraderError::ConfigMissing {
            section: "strategy".to_string(),
            key: "type".to_string(),
        })?;

    if !STRATEGY_TYPES.contains(&name.as_str()) {
        return Err(ChaintraderError::UnknownStrategy { name });
    }
    Ok(name)
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "strategy", "position_size")? {
        Some(v) if v <= 0.0 || v > 1.0 => Err(invalid(
            "strategy",
            "position_size",
            "position_size must be between 0 and 1",
        )),
        _ => Ok(()),
    }
}

fn validate_windows(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let window = |key: &str| -> Result<Option<f64>, ChaintraderError> {
        match number(config, "strategy", key)? {
            Some(v) if v < 1.0 || v.fract() != 0.0 => Err(invalid(
                "strategy",
                key,
                &format!("{key} must be a positive integer"),
            )),
            other => Ok(other),
        }
    };

    let fast = window("fast_window")?.unwrap_or(50.0);
    let slow = window("slow_window")?.unwrap_or(200.0);
    if fast >= slow {
        return Err(invalid(
            "strategy",
            "fast_window",
            "fast_window must be smaller than slow_window",
        ));
    }
    Ok(())
}

fn validate_zscore(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match number(config, "strategy", "zscore_window")? {
        Some(v) if v < 2.0 || v.fract() != 0.0 => {
            return Err(invalid(
                "strategy",
                "zscore_window",
                "zscore_window must be an integer of at least 2",
            ));
        }
        _ => {}
    }
    number(config, "strategy", "zscore_threshold")?;
    match config.get_string("strategy", "zscore_column") {
        Some(c) if c.trim().is_empty() => Err(invalid(
            "strategy",
            "zscore_column",
            "zscore_column must not be empty",
        )),
        _ => Ok(()),
    }
}
