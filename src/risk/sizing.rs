//! Position sizing from balance and per-trade risk

use thiserror::Error;
use tracing::warn;

use crate::config::SizingConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("stop-loss distance must be positive (got {0} pips)")]
    NonPositiveStop(f64),
    #[error("pip value must be positive (got {0})")]
    NonPositivePipValue(f64),
    #[error("minimum lot must be positive (got {0})")]
    NonPositiveMinLot(f64),
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lots such that hitting the stop loses `risk_percent` of `balance`,
/// clamped up to `min_lot`
pub fn dynamic_lots(
    balance: f64,
    risk_percent: f64,
    stop_loss_pips: f64,
    pip_value: f64,
    min_lot: f64,
) -> Result<f64, SizingError> {
    if !(stop_loss_pips > 0.0) {
        return Err(SizingError::NonPositiveStop(stop_loss_pips));
    }
    if !(pip_value > 0.0) {
        return Err(SizingError::NonPositivePipValue(pip_value));
    }
    if !(min_lot > 0.0) {
        return Err(SizingError::NonPositiveMinLot(min_lot));
    }

    let risk_amount = balance * risk_percent / 100.0;
    let lots = round2(risk_amount / (stop_loss_pips * pip_value));
    if lots < min_lot {
        warn!(
            computed = lots,
            min_lot, balance, risk_percent, "Computed lot size below minimum, using minimum"
        );
        return Ok(min_lot);
    }
    Ok(lots)
}

/// Volume for the next entry under `config`
pub fn lots_for(
    config: &SizingConfig,
    balance: f64,
    stop_loss_pips: f64,
    pip_value: f64,
) -> Result<f64, SizingError> {
    if config.use_dynamic_lot {
        dynamic_lots(
            balance,
            config.risk_percent,
            stop_loss_pips,
            pip_value,
            config.min_lot,
        )
    } else {
        Ok(config.fixed_lot)
    }
}
