//! Chain access: gateway facade, signing/submission, receipt handling

pub mod gateway;
pub mod receipt;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;

pub use gateway::{AlloyGateway, ChainGateway, LogStream, RawLog, ReceiptLogs, TxSummary};
pub use receipt::{extract_token_out, extract_transfer, wait_for_receipt, ReceiptPolicy};
pub use submitter::{CallRequest, GasPolicy, TxSubmitter, APPROVE_GAS_LIMIT, TRADE_GAS_LIMIT};
