pub mod contract;
pub mod engine;
pub mod error;
pub mod settlement;
pub mod store;
pub mod sweep;

pub use contract::{
    Contract, ContractDraft, ContractKind, ContractState, EXPIRATION_MINUTES, NewContract,
    SettlementLog,
};
pub use engine::ContractEngine;
pub use error::ContractError;
pub use settlement::Settlement;
pub use store::{ContractStore, StoreError};
pub use sweep::SweepReport;
