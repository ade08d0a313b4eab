//! Logging setup shared by tests and demos.

/// Log to stderr, at `debug` unless `RUST_LOG` says otherwise.
///
/// Lines look like `DEBUG conn=3 peer=127.0.0.1:5000: started time=... target=tether_net::connection`, so that
/// interleaved output from many connections can still be grepped apart.
///
/// If called multiple times in the same process, only applies once.  Safe to call from every test.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let res = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .parse_default_env()
            .format(|buf, record| {
                use std::io::Write;

                let now = time::OffsetDateTime::now_utc();

                writeln!(
                    buf,
                    "{} {} time={} target={}",
                    record.level(),
                    record.args(),
                    now,
                    record.target()
                )
            })
            .is_test(true)
            .try_init();

        // Someone else got there first, for example a test harness.  Their logger wins.
        if res.is_err() {
            log::debug!("A logger was already installed; not installing ours");
        }
    });
}
