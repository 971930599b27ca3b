//! Point accumulation domain types.
//! Framework-agnostic representation of a purchase and the points it earns.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder used when a reconstructed request is missing a text field.
pub const UNKNOWN_ID: &str = "unknown";
/// Placeholder used when a reconstructed request is missing its partner type.
pub const UNKNOWN_PARTNER_TYPE: &str = "UNKNOWN";

/// An accumulation request as received from a client or rebuilt from a failure event.
///
/// `partner_type` stays a raw string so that a request carrying an unsupported
/// or placeholder type can still be recorded and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRequest {
    pub member_id: String,
    pub partner_id: String,
    pub partner_type: String,
    pub amount: BigDecimal,
}

impl PointRequest {
    /// Path form used for failure diagnostics. Each segment is `key=value` so the
    /// request can be rebuilt from the path alone. Values are form-encoded.
    pub fn to_diagnostic_path(&self) -> String {
        let amount = self.amount.to_string();
        let segments = [
            ("memberId", self.member_id.as_str()),
            ("partnerId", self.partner_id.as_str()),
            ("partnerType", self.partner_type.as_str()),
            ("amount", amount.as_str()),
        ];
        let mut path = String::from("/points/accumulate");
        for (key, value) in segments {
            path.push('/');
            path.push_str(key);
            path.push('=');
            path.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
        }
        path
    }
}

/// Supported partner types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerType {
    Mart,
    Convenience,
    Online,
}

impl PartnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerType::Mart => "MART",
            PartnerType::Convenience => "CONVENIENCE",
            PartnerType::Online => "ONLINE",
        }
    }

    /// Fraction of the purchase amount credited as points.
    pub fn points_rate(&self) -> BigDecimal {
        match self {
            PartnerType::Mart => BigDecimal::from(1) / BigDecimal::from(100),
            PartnerType::Convenience => BigDecimal::from(5) / BigDecimal::from(1000),
            PartnerType::Online => BigDecimal::from(2) / BigDecimal::from(100),
        }
    }

    /// Points earned for `amount`, rounded down to a whole number.
    /// `amount` must already be validated as positive.
    pub fn points_for(&self, amount: &BigDecimal) -> BigDecimal {
        // with_scale truncates toward zero, which is floor for positive values
        (amount * self.points_rate()).with_scale(0)
    }
}

impl fmt::Display for PartnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPartnerType(pub String);

impl fmt::Display for UnknownPartnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported partner type: {}", self.0)
    }
}

impl std::error::Error for UnknownPartnerType {}

impl FromStr for PartnerType {
    type Err = UnknownPartnerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MART" => Ok(PartnerType::Mart),
            "CONVENIENCE" => Ok(PartnerType::Convenience),
            "ONLINE" => Ok(PartnerType::Online),
            other => Err(UnknownPartnerType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// A point transaction before the store assigns its identifier.
#[derive(Debug, Clone)]
pub struct NewPointTransaction {
    pub member_id: String,
    pub partner_id: String,
    pub partner_type: PartnerType,
    pub amount: BigDecimal,
    pub points: BigDecimal,
    pub transaction_time: DateTime<Utc>,
    pub status: TransactionStatus,
    /// Recovery ledger entry this transaction credits. At most one
    /// transaction exists per entry.
    pub history_id: Option<Uuid>,
}

impl NewPointTransaction {
    pub fn completed(request: &PointRequest, partner_type: PartnerType) -> Self {
        Self {
            member_id: request.member_id.clone(),
            partner_id: request.partner_id.clone(),
            partner_type,
            amount: request.amount.clone(),
            points: partner_type.points_for(&request.amount),
            transaction_time: Utc::now(),
            status: TransactionStatus::Completed,
            history_id: None,
        }
    }

    pub fn for_history(mut self, history_id: Uuid) -> Self {
        self.history_id = Some(history_id);
        self
    }
}

/// A persisted point transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    pub id: i64,
    pub member_id: String,
    pub partner_id: String,
    pub partner_type: PartnerType,
    pub amount: BigDecimal,
    pub points: BigDecimal,
    pub transaction_time: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Outcome returned to the caller of a successful accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationResult {
    pub transaction_id: i64,
    pub member_id: String,
    pub partner_id: String,
    pub partner_type: PartnerType,
    pub amount: BigDecimal,
    pub points: BigDecimal,
    pub status: TransactionStatus,
    pub processed_at: DateTime<Utc>,
    pub message: String,
}

impl From<PointTransaction> for AccumulationResult {
    fn from(tx: PointTransaction) -> Self {
        Self {
            transaction_id: tx.id,
            member_id: tx.member_id,
            partner_id: tx.partner_id,
            partner_type: tx.partner_type,
            amount: tx.amount,
            points: tx.points,
            status: tx.status,
            processed_at: tx.transaction_time,
            message: "Points accumulated successfully".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_points_per_partner_type() {
        assert_eq!(PartnerType::Mart.points_for(&dec("10000")), dec("100"));
        assert_eq!(PartnerType::Convenience.points_for(&dec("10000")), dec("50"));
        assert_eq!(PartnerType::Online.points_for(&dec("10000")), dec("200"));
    }

    #[test]
    fn test_points_round_down() {
        assert_eq!(PartnerType::Convenience.points_for(&dec("199")), dec("0"));
        assert_eq!(PartnerType::Mart.points_for(&dec("199.99")), dec("1"));
        assert_eq!(PartnerType::Online.points_for(&dec("0.01")), dec("0"));
    }

    #[test]
    fn test_partner_type_parse_is_exact() {
        assert_eq!("MART".parse::<PartnerType>(), Ok(PartnerType::Mart));
        assert!("mart".parse::<PartnerType>().is_err());
        assert!(UNKNOWN_PARTNER_TYPE.parse::<PartnerType>().is_err());
    }

    #[test]
    fn test_diagnostic_path_segments() {
        let req = PointRequest {
            member_id: "M1".into(),
            partner_id: "P1".into(),
            partner_type: "MART".into(),
            amount: dec("10000"),
        };
        assert_eq!(
            req.to_diagnostic_path(),
            "/points/accumulate/memberId=M1/partnerId=P1/partnerType=MART/amount=10000"
        );
    }

    #[test]
    fn test_diagnostic_path_encodes_reserved_characters() {
        let req = PointRequest {
            member_id: "A+B".into(),
            partner_id: "x/y&z=1%".into(),
            partner_type: "MART".into(),
            amount: dec("12.5"),
        };
        assert_eq!(
            req.to_diagnostic_path(),
            "/points/accumulate/memberId=A%2BB/partnerId=x%2Fy%26z%3D1%25/partnerType=MART/amount=12.5"
        );
    }
}
