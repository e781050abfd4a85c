//! Build script for the green node firmware.
//!
//! Sets up the ESP-IDF environment and forces a rebuild when the baked-in
//! credentials change.

fn main() {
    embuild::espidf::sysenv::output();

    for var in [
        "GREEN_WIFI_SSID",
        "GREEN_WIFI_PASSWORD",
        "GREEN_MQTT_HOST",
        "GREEN_MQTT_PORT",
        "GREEN_MQTT_USERNAME",
        "GREEN_MQTT_PASSWORD",
        "GREEN_NODE_ID",
        "GREEN_NODE_TYPE",
        "GREEN_UPDATE_URL",
    ] {
        println!("cargo:rerun-if-env-changed={}", var);
    }
}
