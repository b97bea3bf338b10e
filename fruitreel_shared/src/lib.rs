use chrono::{DateTime, Utc};
use fruitreel_core::{
    ConfigurationSummary, PayoutTable, SimulationStats, SlotError, Symbol, WeightTable,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionResponse {
    pub session_id: String,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
    pub total_spins: i64,
    pub total_winnings: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinRequest {
    pub bet_amount: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub total_spins: i64,
    pub total_winnings: i64,
    /// winnings / wagered, percent
    pub rtp: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpinResponse {
    pub symbols: Vec<Symbol>,
    pub payout: u64,
    pub credits_remaining: i64,
    pub is_winner: bool,
    pub winning_symbol: Option<Symbol>,
    pub session_data: SessionData,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProbabilityResponse {
    pub symbols: Vec<Symbol>,
    pub weights: WeightTable,
    pub symbol_probabilities: BTreeMap<Symbol, f64>,
    pub payout_multipliers: PayoutTable,
    pub reel_count: usize,
    pub theoretical_rtp: f64,
    pub exact_rtp: f64,
    pub win_probability: f64,
}

impl From<&ConfigurationSummary> for ProbabilityResponse {
    fn from(summary: &ConfigurationSummary) -> Self {
        Self {
            symbols: summary.symbols.clone(),
            weights: summary.weights.clone(),
            symbol_probabilities: summary.probabilities.clone(),
            payout_multipliers: summary.payouts.clone(),
            reel_count: summary.reel_count,
            theoretical_rtp: summary.theoretical_rtp,
            exact_rtp: summary.exact_rtp,
            win_probability: summary.win_probability,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SimulationRequest {
    pub num_simulations: u64,
    pub bet_amount: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComparisonData {
    pub theoretical_rtp: f64,
    pub actual_rtp: f64,
    /// |actual − theoretical|
    pub rtp_difference: f64,
    /// actual − theoretical
    pub signed_difference: f64,
    pub sample_size_sufficient: bool,
}

impl From<&SimulationStats> for ComparisonData {
    fn from(stats: &SimulationStats) -> Self {
        Self {
            theoretical_rtp: stats.theoretical_rtp,
            actual_rtp: stats.actual_rtp,
            rtp_difference: stats.rtp_difference_abs,
            signed_difference: stats.rtp_difference,
            sample_size_sufficient: stats.sample_size_sufficient,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SimulationResponse {
    pub simulation_stats: SimulationStats,
    pub comparison_data: ComparisonData,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionStats {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub total_spins: i64,
    pub total_wagered: i64,
    pub total_winnings: i64,
    pub final_credits: i64,
    pub estimated_rtp: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminLoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdminInfo {
    pub username: String,
    pub role: String,
    pub token_issued_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
}

pub const MIN_TOTAL_WEIGHT: u64 = 50;
pub const MAX_TOTAL_WEIGHT: u64 = 200;
pub const MAX_MULTIPLIER: u32 = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminProbabilityUpdate {
    pub symbol_weights: WeightTable,
    pub payout_multipliers: PayoutTable,
}

impl AdminProbabilityUpdate {
    /// Admin panel policy on top of the engine's own validation.
    pub fn validate(&self) -> ApiResult<()> {
        if self.symbol_weights.is_empty() {
            return Err(ApiError::Invalid("symbol weights cannot be empty".into()));
        }
        if self.payout_multipliers.is_empty() {
            return Err(ApiError::Invalid("payout multipliers cannot be empty".into()));
        }
        if let Some((sym, _)) = self.symbol_weights.iter().find(|(_, w)| *w == 0) {
            return Err(ApiError::Invalid(format!(
                "weight for symbol {sym} must be a positive integer"
            )));
        }
        let total = self.symbol_weights.total();
        if !(MIN_TOTAL_WEIGHT..=MAX_TOTAL_WEIGHT).contains(&total) {
            return Err(ApiError::Invalid(format!(
                "symbol weights sum must be between {MIN_TOTAL_WEIGHT} and {MAX_TOTAL_WEIGHT}, got {total}"
            )));
        }
        for (sym, m) in self.payout_multipliers.iter() {
            if m == 0 || m > MAX_MULTIPLIER {
                return Err(ApiError::Invalid(format!(
                    "multiplier for symbol {sym} must be between 1 and {MAX_MULTIPLIER}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminUpdateResponse {
    pub message: String,
    pub new_configuration: ProbabilityResponse,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyticsResponse {
    pub period_hours: i64,
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub total_spins: i64,
    pub total_wagered: i64,
    pub total_winnings: i64,
    pub house_edge_percent: f64,
    pub average_spins_per_session: f64,
    pub current_probability_config: ProbabilityResponse,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub session_id: String,
    pub bet_amount: i64,
    pub symbols: Vec<Symbol>,
    pub payout: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("insufficient credits: balance {credits}, bet {bet}")]
    InsufficientCredits { credits: i64, bet: i64 },
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// Short machine-readable name used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Invalid(_) => "ValidationError",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::InsufficientCredits { .. } => "InsufficientCredits",
            ApiError::Internal => "InternalError",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl From<SlotError> for ApiError {
    fn from(err: SlotError) -> Self {
        ApiError::Invalid(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
