mod printer;
mod proxy;
mod request;
mod upload;


pub use printer::{create_printer, NullPrinter, ThermalPrinter};
pub use proxy::{PeripheralProxy, ProxyStats, ProxyStatsSnapshot};
pub use request::{PeripheralEvent, PeripheralHandler, PeripheralRequest};
pub use upload::{
    create_uploader, encode_animation, AtendeUploader, DropboxUploader, NoopUploader,
    SessionUploader, UploadDriver,
};
