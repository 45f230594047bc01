pub mod campaign;
pub mod click;
pub mod dispatch;
pub mod ledger;
pub mod macro_set;
pub mod money;

pub use campaign::{
    Campaign, CampaignContext, CampaignMetrics, CurrencyTotals, FacebookCredentials,
    GoogleCredentials, MacroMapping, MappedField, MetricsDelta, MoneyDelta, Offer, OfferSource,
    TrafficChannel, parse_macro_mapping,
};
pub use click::{Click, ClickContext};
pub use dispatch::{DispatchRecord, DispatchStatus, Platform, error_codes};
pub use ledger::{
    Conversion, ConversionEvent, CostEntry, DEFAULT_EVENT_NAME, HashedIdentifiers, MatchResult,
    UserIdentifiers,
};
pub use macro_set::{MACRO_SLOTS, MacroKey, MacroPatch, MacroSet};
pub use money::{Currency, Money};
