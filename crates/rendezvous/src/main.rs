use wtrendezvous::config::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    wtrendezvous_common::cli::run_app_with_cli_and_config::<Config>(
        wtrendezvous::APP_NAME,
        wtrendezvous::APP_VERSION,
        wtrendezvous::run,
        None,
    )
}
