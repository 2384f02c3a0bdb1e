use crate::{params::TokenomicsState, settings::Settings};
use anyhow::{Result, bail};
use rust_decimal::Decimal;

fn in_unit_interval(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

/// Validate the configuration values
pub fn validate_config(settings: &Settings) -> Result<()> {
    // Validate log level
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&settings.log_level.to_lowercase().as_str()) {
        bail!(
            "Invalid log level '{}'. Valid options are: {:?}",
            settings.log_level,
            valid_log_levels
        );
    }

    // Validate tokenomics settings
    let tokenomics = &settings.tokenomics;
    if tokenomics.subsidy_reduction_interval <= Decimal::ZERO
        || tokenomics.subsidy_reduction_interval > Decimal::ONE
    {
        bail!(
            "Tokenomics subsidy_reduction_interval must be in (0.0, 1.0], got {}",
            tokenomics.subsidy_reduction_interval
        );
    }
    if !in_unit_interval(tokenomics.subsidy_reduction_amount) {
        bail!(
            "Tokenomics subsidy_reduction_amount must be between 0.0 and 1.0, got {}",
            tokenomics.subsidy_reduction_amount
        );
    }
    if tokenomics.total_subsidy_supply <= 0 {
        bail!(
            "Tokenomics total_subsidy_supply must be positive, got {}",
            tokenomics.total_subsidy_supply
        );
    }

    // Validate bitcoin reward settings
    if settings.bitcoin_rewards.decay_rate > Decimal::ZERO {
        bail!(
            "Bitcoin rewards decay_rate must not be positive, got {}",
            settings.bitcoin_rewards.decay_rate
        );
    }

    // Validate collateral settings
    if !in_unit_interval(settings.collateral.slash_fraction_downtime) {
        bail!(
            "Collateral slash_fraction_downtime must be between 0.0 and 1.0, got {}",
            settings.collateral.slash_fraction_downtime
        );
    }
    if !in_unit_interval(settings.collateral.downtime_missed_percentage_threshold) {
        bail!(
            "Collateral downtime_missed_percentage_threshold must be between 0.0 and 1.0, got {}",
            settings.collateral.downtime_missed_percentage_threshold
        );
    }

    // Validate validation settings
    let validation = &settings.validation;
    if !in_unit_interval(validation.min_validation_average)
        || !in_unit_interval(validation.max_validation_average)
    {
        bail!("Validation averages must be between 0.0 and 1.0");
    }
    if validation.min_validation_average > validation.max_validation_average {
        bail!(
            "Validation min_validation_average ({}) exceeds max_validation_average ({})",
            validation.min_validation_average,
            validation.max_validation_average
        );
    }
    if validation.min_validation_halfway < validation.min_validation_average
        || validation.min_validation_halfway > validation.max_validation_average
    {
        bail!(
            "Validation min_validation_halfway must lie between the min and max averages, got {}",
            validation.min_validation_halfway
        );
    }
    // halfway must stay above the min cutoff or the middle segment divides by zero
    if validation.min_validation_traffic_cutoff.saturating_mul(2)
        >= validation.full_validation_traffic_cutoff
    {
        bail!(
            "Validation min_validation_traffic_cutoff ({}) must be below half of full_validation_traffic_cutoff ({})",
            validation.min_validation_traffic_cutoff,
            validation.full_validation_traffic_cutoff
        );
    }

    // Validate epoch settings
    if settings.epoch.epoch_length <= 0 {
        bail!(
            "Epoch epoch_length must be positive, got {}",
            settings.epoch.epoch_length
        );
    }

    Ok(())
}

/// Validate cumulative state loaded alongside the configuration
pub fn validate_state(state: &TokenomicsState) -> Result<()> {
    let rate = state.current_subsidy_percentage.as_decimal();
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        bail!("Current subsidy percentage must be in [0.0, 1.0), got {rate}");
    }
    if state.total_subsidy_paid < 0 {
        bail!(
            "Total subsidy paid must not be negative, got {}",
            state.total_subsidy_paid
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SinglePrecisionRate;
    use rust_decimal::dec;

    fn create_valid_config() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.log_level = "invalid".to_string();
        assert!(validate_config(&config).is_err());

        config.log_level = "WARN".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_tokenomics() {
        let mut config = create_valid_config();
        config.tokenomics.subsidy_reduction_interval = Decimal::ZERO;
        assert!(validate_config(&config).is_err());

        config = create_valid_config();
        config.tokenomics.subsidy_reduction_amount = dec!(1.5);
        assert!(validate_config(&config).is_err());

        config = create_valid_config();
        config.tokenomics.total_subsidy_supply = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_positive_decay_rate_rejected() {
        let mut config = create_valid_config();
        config.bitcoin_rewards.decay_rate = dec!(0.001);
        assert!(validate_config(&config).is_err());

        config.bitcoin_rewards.decay_rate = Decimal::ZERO;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_collateral_fractions() {
        let mut config = create_valid_config();
        config.collateral.slash_fraction_downtime = dec!(-0.1);
        assert!(validate_config(&config).is_err());

        config = create_valid_config();
        config.collateral.downtime_missed_percentage_threshold = dec!(1.01);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_validation_curve() {
        let mut config = create_valid_config();
        config.validation.min_validation_average = dec!(0.5);
        config.validation.max_validation_average = dec!(0.4);
        assert!(validate_config(&config).is_err());

        config = create_valid_config();
        config.validation.min_validation_halfway = dec!(0.001);
        assert!(validate_config(&config).is_err());

        config = create_valid_config();
        config.validation.min_validation_traffic_cutoff = 5_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_epoch_length() {
        let mut config = create_valid_config();
        config.epoch.epoch_length = -1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_state_rate_bounds() {
        let mut state = TokenomicsState::default();
        assert!(validate_state(&state).is_ok());

        state.current_subsidy_percentage = SinglePrecisionRate::from_decimal(Decimal::ONE).unwrap();
        assert!(validate_state(&state).is_err());

        state = TokenomicsState {
            total_subsidy_paid: -1,
            ..TokenomicsState::default()
        };
        assert!(validate_state(&state).is_err());
    }
}
