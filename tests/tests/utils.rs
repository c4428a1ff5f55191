use std::sync::OnceLock;
use std::time::Duration;
use surge::prelude::*;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("surge=debug,mock_service=info")
            .with_test_writer()
            .try_init();
    });
}

/// The reference checks against `url`, with a short sleep and tick so runs stay quick.
#[allow(unused)]
pub fn config(url: &str) -> RunConfig {
    RunConfig::new(Url::parse(url).unwrap())
        .query(&Query::Raw("q=tech".to_string()))
        .check(Check::status("is status 200", 200))
        .check(Check::faster_than("is fast", Duration::from_millis(200)))
        .sleep(Duration::from_millis(100))
        .tick(Duration::from_millis(50))
        .timeout(Duration::from_secs(2))
        .graceful_stop(Duration::from_secs(2))
}
