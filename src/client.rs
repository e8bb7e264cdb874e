//! EcoFlow IoT open API client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::power::PowerStatus;
use crate::sign::{flatten_params, Signer};

/// Serial prefix of PowerStream micro-inverters.
pub const INVERTER_SN_PREFIX: &str = "HW51";

/// Serial prefix of smart plugs.
pub const PLUG_SN_PREFIX: &str = "HW52";

/// PV input 1 of a micro-inverter (0.1 W).
pub const QUOTA_PV1_INPUT_WATTS: &str = "20_1.pv1InputWatts";

/// PV input 2 of a micro-inverter (0.1 W).
pub const QUOTA_PV2_INPUT_WATTS: &str = "20_1.pv2InputWatts";

/// Load measured by a smart plug (0.1 W).
pub const QUOTA_PLUG_WATTS: &str = "2_1.watts";

const DEVICE_LIST_PATH: &str = "/iot-open/sign/device/list";
const QUOTA_ALL_PATH: &str = "/iot-open/sign/device/quota/all";
const QUOTA_PATH: &str = "/iot-open/sign/device/quota";

/// How long a discovered device set is trusted before the list is fetched
/// again.
pub const DISCOVERY_TTL: Duration = Duration::from_secs(600);

/// Quota name to reported value.
pub type QuotaMap = serde_json::Map<String, Value>;

/// Anything that can produce a fresh [`PowerStatus`].
///
/// The poll controller only depends on this trait, so hosts and tests can
/// substitute their own source.
#[async_trait]
pub trait PowerSource: Send + Sync {
    /// Fetch the current generation and consumption.
    async fn power_status(&self) -> Result<PowerStatus, Error>;
}

/// A device bound to the developer account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Serial number
    pub sn: String,

    /// User-assigned name
    #[serde(default)]
    pub device_name: Option<String>,

    /// Product family (e.g. "PowerStream")
    #[serde(default)]
    pub product_name: Option<String>,

    /// 1 when the device is connected to the cloud
    #[serde(default)]
    pub online: u8,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.online == 1
    }

    pub fn is_inverter(&self) -> bool {
        self.sn.starts_with(INVERTER_SN_PREFIX)
    }

    pub fn is_smart_plug(&self) -> bool {
        self.sn.starts_with(PLUG_SN_PREFIX)
    }
}

/// PV inputs of one micro-inverter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverterReading {
    pub pv1_input: f64,
    pub pv2_input: f64,
}

impl InverterReading {
    /// Combined generation of both inputs.
    pub fn total(&self) -> f64 {
        self.pv1_input + self.pv2_input
    }
}

/// Serial numbers polled for a power status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSet {
    pub inverters: Vec<String>,
    pub plugs: Vec<String>,
}

impl DeviceSet {
    /// Pick the online inverters and plugs from a device list.
    pub fn discover(devices: &[Device]) -> Self {
        let online = devices.iter().filter(|d| d.is_online());
        let (inverters, plugs): (Vec<&Device>, Vec<&Device>) = online
            .filter(|d| d.is_inverter() || d.is_smart_plug())
            .partition(|d| d.is_inverter());

        Self {
            inverters: inverters.into_iter().map(|d| d.sn.clone()).collect(),
            plugs: plugs.into_iter().map(|d| d.sn.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inverters.is_empty() && self.plugs.is_empty()
    }
}

/// Result of the last device discovery and when it ran.
#[derive(Debug, Default)]
struct DiscoveryCache {
    entry: Option<(Instant, DeviceSet)>,
}

impl DiscoveryCache {
    fn get(&self, now: Instant) -> Option<DeviceSet> {
        self.entry
            .as_ref()
            .filter(|(at, _)| now.duration_since(*at) < DISCOVERY_TTL)
            .map(|(_, set)| set.clone())
    }

    fn store(&mut self, now: Instant, set: DeviceSet) {
        self.entry = Some((now, set));
    }

    fn clear(&mut self) -> bool {
        self.entry.take().is_some()
    }
}

/// Response wrapper used by every EcoFlow endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: Value,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, Error> {
        let code = match self.code {
            Value::String(s) => s,
            other => other.to_string(),
        };
        if code != "0" {
            return Err(Error::Vendor {
                code,
                message: self.message.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| Error::Serialization("response has no data".to_string()))
    }
}

/// EcoFlow cloud client.
///
/// # Example
///
/// ```rust,no_run
/// use eco_power_deck::{ClientConfig, EcoFlowClient};
///
/// # async fn example() -> Result<(), eco_power_deck::Error> {
/// let client = EcoFlowClient::new(ClientConfig::new("access-key", "secret-key"))?;
///
/// let status = client.get_power_status().await?;
/// println!("Generating {} / consuming {}", status.generation.current, status.consumption.total);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EcoFlowClient {
    http: reqwest::Client,
    signer: Signer,
    base_url: String,
    configured: DeviceSet,
    discovered: Arc<Mutex<DiscoveryCache>>,
}

impl EcoFlowClient {
    /// Create a client from a config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            signer: Signer::new(config.access_key, config.secret_key),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            configured: DeviceSet {
                inverters: config.inverter_sns,
                plugs: config.plug_sns,
            },
            discovered: Arc::new(Mutex::new(DiscoveryCache::default())),
        })
    }

    /// Create a client from `ECOFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Set a custom HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List all devices bound to the account.
    pub async fn get_devices(&self) -> Result<Vec<Device>, Error> {
        self.get(DEVICE_LIST_PATH, json!({})).await
    }

    /// Every quota a device currently reports.
    pub async fn get_device_all_quotas(&self, sn: &str) -> Result<QuotaMap, Error> {
        self.get(QUOTA_ALL_PATH, json!({ "sn": sn })).await
    }

    /// Selected quotas of a device.
    pub async fn get_device_quotas(&self, sn: &str, quotas: &[&str]) -> Result<QuotaMap, Error> {
        self.post(
            QUOTA_PATH,
            json!({
                "sn": sn,
                "params": { "quotas": quotas },
            }),
        )
        .await
    }

    /// PV inputs of a micro-inverter.
    pub async fn get_inverter_quotas(&self, sn: &str) -> Result<InverterReading, Error> {
        let quotas = self
            .get_device_quotas(sn, &[QUOTA_PV1_INPUT_WATTS, QUOTA_PV2_INPUT_WATTS])
            .await?;

        Ok(InverterReading {
            pv1_input: quota_value(&quotas, sn, QUOTA_PV1_INPUT_WATTS)?,
            pv2_input: quota_value(&quotas, sn, QUOTA_PV2_INPUT_WATTS)?,
        })
    }

    /// Load currently measured by a smart plug.
    pub async fn get_plug_watts(&self, sn: &str) -> Result<f64, Error> {
        let quotas = self.get_device_quotas(sn, &[QUOTA_PLUG_WATTS]).await?;
        quota_value(&quotas, sn, QUOTA_PLUG_WATTS)
    }

    /// Generation of all inverters against the load of all plugs.
    ///
    /// A device that stops answering (missing quota or a vendor error)
    /// drops the discovered device set, so the next call lists the account
    /// again and picks up devices that came online in the meantime.
    pub async fn get_power_status(&self) -> Result<PowerStatus, Error> {
        let devices = self.devices().await?;

        let result = self.read_power_status(&devices).await;
        if matches!(result, Err(Error::MissingQuota { .. } | Error::Vendor { .. })) {
            self.forget_discovery();
        }
        result
    }

    async fn read_power_status(&self, devices: &DeviceSet) -> Result<PowerStatus, Error> {
        let mut generation = 0.0;
        for sn in &devices.inverters {
            generation += self.get_inverter_quotas(sn).await?.total();
        }

        let mut consumption = 0.0;
        for sn in &devices.plugs {
            consumption += self.get_plug_watts(sn).await?;
        }

        PowerStatus::from_readings(generation, consumption)
    }

    /// Configured serials, completed by discovery when a list is empty.
    ///
    /// A discovered set is reused for [`DISCOVERY_TTL`]; a failed discovery
    /// is retried on the next call.
    async fn devices(&self) -> Result<DeviceSet, Error> {
        if !self.configured.inverters.is_empty() && !self.configured.plugs.is_empty() {
            return Ok(self.configured.clone());
        }

        let cached = self.discovered.lock().get(Instant::now());
        let discovered = match cached {
            Some(set) => set,
            None => {
                let devices = self.get_devices().await?;
                let found = DeviceSet::discover(&devices);
                tracing::info!(
                    "Discovered {} inverter(s) and {} smart plug(s) out of {} device(s)",
                    found.inverters.len(),
                    found.plugs.len(),
                    devices.len()
                );
                self.discovered.lock().store(Instant::now(), found.clone());
                found
            }
        };

        let set = DeviceSet {
            inverters: if self.configured.inverters.is_empty() {
                discovered.inverters.clone()
            } else {
                self.configured.inverters.clone()
            },
            plugs: if self.configured.plugs.is_empty() {
                discovered.plugs.clone()
            } else {
                self.configured.plugs.clone()
            },
        };

        if set.is_empty() {
            self.forget_discovery();
            return Err(Error::Config(
                "No online inverter or smart plug found on this account".to_string(),
            ));
        }
        Ok(set)
    }

    fn forget_discovery(&self) {
        if self.discovered.lock().clear() {
            tracing::info!("Discarded discovered devices, listing again on the next poll");
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: Value) -> Result<T, Error> {
        let headers = self.signer.auth_headers(&params);
        let pairs = flatten_params(&params);

        let mut url = format!("{}{}", self.base_url, path);
        if !pairs.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();
            url = format!("{}?{}", url, query);
        }

        let mut request = self.http.get(&url);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        tracing::debug!("GET {}", path);
        read_envelope(request.send().await?).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, params: Value) -> Result<T, Error> {
        let headers = self.signer.auth_headers(&params);
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json;charset=UTF-8")
            .json(&params);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        tracing::debug!("POST {}", path);
        read_envelope(request.send().await?).await
    }
}

#[async_trait]
impl PowerSource for EcoFlowClient {
    async fn power_status(&self) -> Result<PowerStatus, Error> {
        self.get_power_status().await
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api { status, body });
    }

    let body = response.bytes().await?;
    let envelope: Envelope<T> = serde_json::from_slice(&body)?;
    envelope.into_data()
}

fn quota_value(quotas: &QuotaMap, sn: &str, quota: &str) -> Result<f64, Error> {
    quotas
        .get(quota)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::MissingQuota {
            sn: sn.to_string(),
            quota: quota.to_string(),
        })
}
