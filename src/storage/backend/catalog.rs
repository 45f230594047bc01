//! Campaign / traffic channel / offer / offer source rows
//!
//! Written by the admin API, read by the campaign context provider.

use sea_orm::{EntityTrait, sea_query::OnConflict};
use tracing::info;

use super::converters::{
    campaign_to_active_model, model_to_campaign, model_to_offer, model_to_offer_source,
    model_to_traffic_channel, offer_source_to_active_model, offer_to_active_model,
    traffic_channel_to_active_model,
};
use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::{Campaign, CampaignContext, Offer, OfferSource, TrafficChannel};
use migration::entities::{campaign, offer, offer_source, traffic_channel};

impl SeaOrmStorage {
    pub async fn upsert_campaign(&self, value: &Campaign) -> Result<()> {
        let db = &self.db;
        let active = campaign_to_active_model(value);
        retry::with_retry("upsert_campaign", self.db_retry, || async {
            campaign::Entity::insert(active.clone())
                .on_conflict(
                    OnConflict::column(campaign::Column::Id)
                        .update_columns([
                            campaign::Column::Name,
                            campaign::Column::TrafficChannelId,
                            campaign::Column::OfferId,
                            campaign::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await?;
        info!("Campaign upserted: {}", value.id);
        Ok(())
    }

    pub async fn upsert_traffic_channel(&self, value: &TrafficChannel) -> Result<()> {
        let db = &self.db;
        let active = traffic_channel_to_active_model(value)?;
        retry::with_retry("upsert_traffic_channel", self.db_retry, || async {
            traffic_channel::Entity::insert(active.clone())
                .on_conflict(
                    OnConflict::column(traffic_channel::Column::Id)
                        .update_columns([
                            traffic_channel::Column::Name,
                            traffic_channel::Column::PlatformType,
                            traffic_channel::Column::FacebookPixelId,
                            traffic_channel::Column::FacebookAccessToken,
                            traffic_channel::Column::FacebookTestEventCode,
                            traffic_channel::Column::GoogleAccountId,
                            traffic_channel::Column::GoogleConversionId,
                            traffic_channel::Column::GoogleConversionLabel,
                            traffic_channel::Column::MacroMapping,
                            traffic_channel::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await?;
        info!("Traffic channel upserted: {}", value.id);
        Ok(())
    }

    pub async fn upsert_offer(&self, value: &Offer) -> Result<()> {
        let db = &self.db;
        let active = offer_to_active_model(value);
        retry::with_retry("upsert_offer", self.db_retry, || async {
            offer::Entity::insert(active.clone())
                .on_conflict(
                    OnConflict::column(offer::Column::Id)
                        .update_columns([
                            offer::Column::Name,
                            offer::Column::OfferSourceId,
                            offer::Column::PayoutMicros,
                            offer::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await?;
        info!("Offer upserted: {}", value.id);
        Ok(())
    }

    pub async fn upsert_offer_source(&self, value: &OfferSource) -> Result<()> {
        let db = &self.db;
        let active = offer_source_to_active_model(value);
        retry::with_retry("upsert_offer_source", self.db_retry, || async {
            offer_source::Entity::insert(active.clone())
                .on_conflict(
                    OnConflict::column(offer_source::Column::Id)
                        .update_columns([offer_source::Column::Name, offer_source::Column::UpdatedAt])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
        })
        .await?;
        info!("Offer source upserted: {}", value.id);
        Ok(())
    }

    /// Join campaign -> traffic channel, offer -> offer source
    ///
    /// `None` when the campaign itself is missing; dangling references
    /// resolve to `None` members.
    pub async fn load_campaign_context(&self, campaign_id: i64) -> Result<Option<CampaignContext>> {
        let db = &self.db;
        let cfg = self.db_retry;

        let Some(campaign) = retry::with_retry("load_campaign", cfg, || async {
            campaign::Entity::find_by_id(campaign_id).one(db).await
        })
        .await?
        .map(model_to_campaign) else {
            return Ok(None);
        };

        let traffic_channel = match campaign.traffic_channel_id {
            Some(id) => retry::with_retry("load_traffic_channel", cfg, || async {
                traffic_channel::Entity::find_by_id(id).one(db).await
            })
            .await?
            .map(model_to_traffic_channel)
            .transpose()?,
            None => None,
        };

        let offer = match campaign.offer_id {
            Some(id) => retry::with_retry("load_offer", cfg, || async {
                offer::Entity::find_by_id(id).one(db).await
            })
            .await?
            .map(model_to_offer),
            None => None,
        };

        let offer_source = match offer.as_ref().and_then(|o| o.offer_source_id) {
            Some(id) => retry::with_retry("load_offer_source", cfg, || async {
                offer_source::Entity::find_by_id(id).one(db).await
            })
            .await?
            .map(model_to_offer_source),
            None => None,
        };

        Ok(Some(CampaignContext {
            campaign,
            traffic_channel,
            offer,
            offer_source,
        }))
    }
}
