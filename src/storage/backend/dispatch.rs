//! Dispatch record persistence (postback log)

use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

use super::converters::{dispatch_record_to_active_model, model_to_dispatch_record};
use super::{SeaOrmStorage, retry};
use crate::errors::{AttributorError, Result};
use crate::storage::models::{DispatchRecord, DispatchStatus};
use migration::entities::dispatch_record::{self, Column, Entity};

/// Filter for records eligible for another attempt
#[derive(Debug, Clone, Copy)]
pub struct RetryFilter {
    pub older_than: DateTime<Utc>,
    pub max_attempts: u32,
}

impl RetryFilter {
    fn condition(&self) -> Condition {
        let failed_retryable = Condition::all()
            .add(Column::Status.eq(DispatchStatus::Failed.as_ref()))
            .add(Column::Retryable.eq(true));
        let stale = Condition::any()
            .add(Column::LastAttemptAt.lt(self.older_than))
            .add(
                Condition::all()
                    .add(Column::LastAttemptAt.is_null())
                    .add(Column::CreatedAt.lt(self.older_than)),
            );

        Condition::all()
            .add(
                Condition::any()
                    .add(failed_retryable)
                    .add(Column::Status.eq(DispatchStatus::Pending.as_ref())),
            )
            .add(Column::AttemptCount.lt(self.max_attempts.min(i32::MAX as u32) as i32))
            .add(stale)
    }
}

impl SeaOrmStorage {
    /// Insert (id == 0) or update the record; returns it with its id set
    pub async fn save_dispatch_record(&self, record: &DispatchRecord) -> Result<DispatchRecord> {
        let db = &self.db;
        let active = dispatch_record_to_active_model(record)?;

        let model = if record.id == 0 {
            Entity::insert(active).exec_with_returning(db).await.map_err(|e| {
                AttributorError::database_operation(format!(
                    "写入投递记录失败 (conversion {}): {}",
                    record.conversion_id, e
                ))
            })?
        } else {
            retry::with_retry("update_dispatch_record", self.db_retry, || async {
                Entity::update(active.clone()).exec(db).await
            })
            .await
            .map_err(|e| match e {
                sea_orm::DbErr::RecordNotUpdated => {
                    AttributorError::not_found(format!("Dispatch record not found: {}", record.id))
                }
                other => AttributorError::from(other),
            })?
        };

        model_to_dispatch_record(model)
    }

    pub async fn get_dispatch_record(&self, id: i64) -> Result<Option<DispatchRecord>> {
        let db = &self.db;
        let model = retry::with_retry("get_dispatch_record", self.db_retry, || async {
            Entity::find_by_id(id).one(db).await
        })
        .await?;
        model.map(model_to_dispatch_record).transpose()
    }

    pub async fn get_dispatch_for_conversion(
        &self,
        conversion_id: &str,
    ) -> Result<Option<DispatchRecord>> {
        let db = &self.db;
        let model = retry::with_retry("get_dispatch_for_conversion", self.db_retry, || async {
            Entity::find()
                .filter(Column::ConversionId.eq(conversion_id))
                .one(db)
                .await
        })
        .await?;
        model.map(model_to_dispatch_record).transpose()
    }

    /// Newest first, optionally filtered by status
    pub async fn list_dispatch_records(
        &self,
        status: Option<DispatchStatus>,
        limit: u64,
    ) -> Result<Vec<DispatchRecord>> {
        let db = &self.db;
        let models = retry::with_retry("list_dispatch_records", self.db_retry, || async {
            let mut query = Entity::find();
            if let Some(status) = status {
                query = query.filter(Column::Status.eq(status.as_ref()));
            }
            query.order_by_desc(Column::Id).limit(limit).all(db).await
        })
        .await?;
        models.into_iter().map(model_to_dispatch_record).collect()
    }

    /// One keyset page of retry candidates with `id > after_id`
    pub async fn retry_candidates_page(
        &self,
        filter: RetryFilter,
        after_id: i64,
        limit: u64,
    ) -> Result<Vec<DispatchRecord>> {
        let db = &self.db;
        let models = retry::with_retry("retry_candidates_page", self.db_retry, || async {
            Entity::find()
                .filter(filter.condition())
                .filter(Column::Id.gt(after_id))
                .order_by_asc(Column::Id)
                .limit(limit)
                .all(db)
                .await
        })
        .await?;
        models.into_iter().map(model_to_dispatch_record).collect()
    }

    /// Lazy stream over all retry candidates, fetched page by page
    ///
    /// Each call starts a fresh scan; the stream ends after the last page.
    pub fn retry_candidates(
        &self,
        filter: RetryFilter,
        page_size: u64,
    ) -> impl Stream<Item = Result<DispatchRecord>> + '_ {
        let page_size = page_size.max(1);

        struct Cursor {
            after_id: i64,
            buffered: std::vec::IntoIter<DispatchRecord>,
            exhausted: bool,
        }

        let start = Cursor {
            after_id: 0,
            buffered: Vec::new().into_iter(),
            exhausted: false,
        };

        stream::unfold(start, move |mut cursor| async move {
            loop {
                if let Some(record) = cursor.buffered.next() {
                    cursor.after_id = record.id;
                    return Some((Ok(record), cursor));
                }
                if cursor.exhausted {
                    return None;
                }

                match self
                    .retry_candidates_page(filter, cursor.after_id, page_size)
                    .await
                {
                    Ok(page) => {
                        cursor.exhausted = (page.len() as u64) < page_size;
                        cursor.buffered = page.into_iter();
                    }
                    Err(e) => {
                        cursor.exhausted = true;
                        return Some((Err(e), cursor));
                    }
                }
            }
        })
    }
}
