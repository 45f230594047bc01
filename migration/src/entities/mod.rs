pub mod campaign;
pub mod campaign_metrics_daily;
pub mod campaign_money_daily;
pub mod click;
pub mod conversion;
pub mod cost_entry;
pub mod dispatch_record;
pub mod macro_set;
pub mod offer;
pub mod offer_source;
pub mod traffic_channel;

pub use campaign::Entity as CampaignEntity;
pub use campaign_metrics_daily::Entity as CampaignMetricsDailyEntity;
pub use campaign_money_daily::Entity as CampaignMoneyDailyEntity;
pub use click::Entity as ClickEntity;
pub use conversion::Entity as ConversionEntity;
pub use cost_entry::Entity as CostEntryEntity;
pub use dispatch_record::Entity as DispatchRecordEntity;
pub use macro_set::Entity as MacroSetEntity;
pub use offer::Entity as OfferEntity;
pub use offer_source::Entity as OfferSourceEntity;
pub use traffic_channel::Entity as TrafficChannelEntity;
