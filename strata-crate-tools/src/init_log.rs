use std::io::Write;

/// 初始化彩色日志
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖，例如 `RUST_LOG=strata_renderer=debug`。
/// 渲染线程与控制线程会同时输出日志，因此每行都带上线程名。
pub fn init_log() {
    let _ = builder().try_init();
}

/// 测试中可以多次调用
pub fn init_test_log() {
    let _ = builder().is_test(true).try_init();
}

fn builder() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let thread_style = info_style.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Cyan)));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("-");

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {thread_style}<{thread_name}>{thread_style:#} \
                 {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
}
