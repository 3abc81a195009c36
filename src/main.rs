use adw::prelude::*;
use adw::Application;

fn main() {
    tanzanite_agent::logging::init();

    let app = Application::builder()
        .application_id("com.tanzanite.AgentDesk")
        .build();
    app.connect_activate(|app| {
        tanzanite_agent::app::build_ui(app);
    });
    app.run();
}
