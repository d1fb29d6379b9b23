/// 実行環境と設定値の管理
pub mod environment;

pub use environment::{
    get_database_filename, get_environment, load_environment_variables, parse_timezone,
    AppConfig, Environment,
};
