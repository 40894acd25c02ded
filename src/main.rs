use env_logger::Env;
use log::error;
use swow_activation::Pipeline;

fn main() {

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = Pipeline::run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
