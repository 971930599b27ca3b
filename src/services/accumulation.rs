use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AccumulationResult, NewPointTransaction, PartnerType, PointRequest, PointTransaction};
use crate::ports::{PointTransactionStore, StoreError};
use crate::resilience::{Classify, FailureKind};
use crate::validation::{self, DateWindow, ValidationError};

#[derive(Debug, Error)]
pub enum AccumulateError {
    #[error("Invalid amount: Amount must be greater than zero")]
    InvalidAmount,
    #[error("Invalid partner type: {0}")]
    InvalidPartnerType(String),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("database error: {0}")]
    Store(#[from] StoreError),
}

impl Classify for AccumulateError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            AccumulateError::InvalidAmount
            | AccumulateError::InvalidPartnerType(_)
            | AccumulateError::Validation(_) => FailureKind::Client,
            AccumulateError::Store(e) if e.is_transient() => FailureKind::Transient,
            AccumulateError::Store(_) => FailureKind::Fatal,
        }
    }
}

/// Checks a request and resolves its partner type.
pub fn validate_request(request: &PointRequest) -> Result<PartnerType, AccumulateError> {
    validation::validate_member_id(&request.member_id)?;
    validation::validate_partner_id(&request.partner_id)?;
    if validation::validate_positive_amount(&request.amount).is_err() {
        return Err(AccumulateError::InvalidAmount);
    }
    request
        .partner_type
        .parse::<PartnerType>()
        .map_err(|e| AccumulateError::InvalidPartnerType(e.0))
}

/// Computes and records points for purchases.
pub struct AccumulationService {
    store: Arc<dyn PointTransactionStore>,
}

impl AccumulationService {
    pub fn new(store: Arc<dyn PointTransactionStore>) -> Self {
        Self { store }
    }

    pub async fn accumulate(&self, request: &PointRequest) -> Result<AccumulationResult, AccumulateError> {
        let partner_type = validate_request(request)?;
        let record = NewPointTransaction::completed(request, partner_type);
        let saved = self.store.insert(&record).await?;

        tracing::info!(
            transaction_id = saved.id,
            member_id = %saved.member_id,
            partner_type = %saved.partner_type,
            points = %saved.points,
            "points accumulated"
        );

        Ok(AccumulationResult::from(saved))
    }

    /// Accumulates on behalf of recovery ledger entry `history_id`. An entry
    /// is credited at most once: if a transaction for it already exists, that
    /// transaction is returned and nothing new is written.
    pub async fn accumulate_for_history(
        &self,
        request: &PointRequest,
        history_id: Uuid,
    ) -> Result<AccumulationResult, AccumulateError> {
        let partner_type = validate_request(request)?;
        let record = NewPointTransaction::completed(request, partner_type).for_history(history_id);
        match self.store.insert(&record).await {
            Ok(saved) => {
                tracing::info!(
                    transaction_id = saved.id,
                    history_id = %history_id,
                    points = %saved.points,
                    "points accumulated for recovered request"
                );
                Ok(AccumulationResult::from(saved))
            }
            Err(StoreError::Conflict(reason)) => match self.store.find_by_history(history_id).await? {
                Some(existing) => {
                    tracing::info!(
                        transaction_id = existing.id,
                        history_id = %history_id,
                        "entry already credited, reusing transaction"
                    );
                    Ok(AccumulationResult::from(existing))
                }
                None => Err(StoreError::Conflict(reason).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn transactions(
        &self,
        member_id: &str,
        window: DateWindow,
    ) -> Result<Vec<PointTransaction>, AccumulateError> {
        validation::validate_member_id(member_id)?;
        Ok(self
            .store
            .find_by_member_between(member_id, window.start, window.end)
            .await?)
    }
}
