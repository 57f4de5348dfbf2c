pub mod cookies;
pub mod delay;
pub mod profiles;
pub mod proxy;
pub mod uule;

pub use cookies::CookieJar;
pub use delay::human_delay_ms;
pub use profiles::{BrowserProfile, ProfilePool};
pub use proxy::ProxyRotator;
pub use uule::{canonical_location_name, encode_uule};
