// MQTT client id: `HOMEBRIDGE_{MACHINE_ID}`.
//
// Every credential pair on one host shares this id.

const PREFIX: &str = "HOMEBRIDGE_";

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Client id for this host.
pub fn default_client_id() -> String {
    client_id_for(&machine_id())
}

pub fn client_id_for(machine_id: &str) -> String {
    format!("{PREFIX}{}", machine_id.trim().to_uppercase())
}

/// The OS machine id, or a random one when the host has none.
fn machine_id() -> String {
    MACHINE_ID_PATHS
        .iter()
        .find_map(|path| {
            std::fs::read_to_string(path)
                .ok()
                .map(|id| id.trim().to_owned())
                .filter(|id| !id.is_empty())
        })
        .unwrap_or_else(|| {
            tracing::warn!("No machine id found, using a random MQTT client id");
            uuid::Uuid::new_v4().simple().to_string()
        })
}
