//! `send`: deliver one command and report the route it took.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use sonofly_core::{CoreError, DeviceId, DeviceKind, Dispatched, Params};

use crate::cli::{GlobalOpts, SendArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct SendReport {
    device: String,
    route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    account: Option<String>,
}

fn detail(r: &SendReport) -> String {
    match r.account {
        Some(ref account) => format!("Sent to {} via {} ({account})", r.device, r.route),
        None => format!("Sent to {} via {}", r.device, r.route),
    }
}

/// Assemble the command payload from `--json`, `--param` and `--cmd`.
fn build_payload(args: &SendArgs) -> Result<Params, CliError> {
    let mut payload = match args.json {
        Some(ref raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => {
                return Err(CliError::Validation {
                    field: "json".into(),
                    reason: "expected a JSON object".into(),
                });
            }
        },
        None => Params::new(),
    };
    for raw in &args.params {
        let (key, value) = util::parse_param(raw)?;
        payload.insert(key, value);
    }
    if let Some(ref cmd) = args.cmd {
        payload.insert("cmd".into(), Value::String(cmd.clone()));
    }
    Ok(payload)
}

pub async fn handle(args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let kind = DeviceId::from(args.device.as_str()).kind();
    if kind == DeviceKind::Invalid {
        return Err(CliError::InvalidIdentifier {
            identifier: args.device,
        });
    }
    let payload = build_payload(&args)?;

    let cfg = config::load(global)?;
    let hub = config::build_hub(&cfg)?;

    // Cameras are addressed directly; no account needs to come up.
    let rejected = if kind == DeviceKind::Standard {
        let accounts = config::selected_accounts(&cfg, global)?;
        util::bring_online(&hub, accounts, Duration::from_secs(args.wait)).await?
    } else {
        None
    };

    let result = hub.dispatch(&args.device, payload).await;
    hub.shutdown().await;

    let report = match result {
        Ok(Dispatched::Device { account, route }) => SendReport {
            device: args.device,
            route: route.to_string(),
            account: Some(account.to_string()),
        },
        Ok(Dispatched::Camera) => SendReport {
            device: args.device,
            route: "camera".into(),
            account: None,
        },
        // A rejected login explains a missing device better than "not found".
        Err(CoreError::UnknownDevice { device_id }) => {
            let err = rejected.unwrap_or(CoreError::UnknownDevice { device_id });
            return Err(err.into());
        }
        Err(e) => return Err(e.into()),
    };

    let out = output::render_single(global.output, &report, detail, |r| r.route.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(json: Option<&str>, params: &[&str], cmd: Option<&str>) -> SendArgs {
        SendArgs {
            device: "1000abcd12".into(),
            cmd: cmd.map(str::to_owned),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
            json: json.map(str::to_owned),
            wait: 0,
        }
    }

    #[test]
    fn payload_from_params_and_cmd() {
        let payload = build_payload(&args(None, &["switch=on", "outlet=1"], Some("switches"))).unwrap();
        assert_eq!(
            Value::Object(payload),
            json!({"switch": "on", "outlet": 1, "cmd": "switches"})
        );
    }

    #[test]
    fn payload_from_json_object_only() {
        let payload = build_payload(&args(Some(r#"{"switch":"off"}"#), &[], None)).unwrap();
        assert_eq!(Value::Object(payload), json!({"switch": "off"}));

        assert!(matches!(
            build_payload(&args(Some("[1,2]"), &[], None)),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            build_payload(&args(Some("{nope"), &[], None)),
            Err(CliError::Json(_))
        ));
    }
}
