#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("Module {0} is not loaded")]
    ModuleNotLoaded(&'static str),
    #[error("Module {0} does not export {1}")]
    MissingExport(&'static str, &'static str),
    #[error("Unable to change page protection of table {0:#x} slot {1}")]
    PageProtection(usize, usize),
    #[error("Entry point {0} is already hooked")]
    AlreadyInstalled(&'static str),
    #[cfg(windows)]
    #[error("Unable to detour entry point: {0}")]
    Detour(#[from] detour::Error),
    #[error("Unable to initialise logging: {0}")]
    Logger(#[from] log::SetLoggerError),
}
