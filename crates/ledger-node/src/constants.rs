pub(crate) const DEFAULT_DATA_DIR: &str = "./data";
pub(crate) const DEFAULT_LEDGER_ID: &str = "main";
