mod app;
mod invoke;
mod state;

pub use app::create_app;
pub use state::AppState;
