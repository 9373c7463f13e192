use serde::Serialize;

/// Environment variable that pins the embedding device regardless of probing.
pub const DEVICE_ENV_VAR: &str = "LEKTOR_DEVICE";

const NVIDIA_DRIVER_PROC: &str = "/proc/driver/nvidia/version";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

/// Snapshot of the compute environment exposed through `GET /settings`.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInfo {
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda_device_name: Option<String>,
}

impl RuntimeInfo {
    /// Probes the local machine. The env override wins over detection so
    /// deployments can force CPU on shared GPU hosts.
    pub fn probe() -> Self {
        if let Ok(forced) = std::env::var(DEVICE_ENV_VAR) {
            return match forced.to_ascii_lowercase().as_str() {
                "cuda" => Self {
                    device: Device::Cuda,
                    cuda_device_name: read_nvidia_driver(),
                },
                _ => Self {
                    device: Device::Cpu,
                    cuda_device_name: None,
                },
            };
        }

        match read_nvidia_driver() {
            Some(name) => Self {
                device: Device::Cuda,
                cuda_device_name: Some(name),
            },
            None => Self {
                device: Device::Cpu,
                cuda_device_name: None,
            },
        }
    }
}

fn read_nvidia_driver() -> Option<String> {
    let contents = std::fs::read_to_string(NVIDIA_DRIVER_PROC).ok()?;
    contents.lines().next().map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_returns_a_device() {
        let info = RuntimeInfo::probe();
        // Whatever the host looks like, cuda implies a driver name and cpu none.
        match info.device {
            Device::Cpu => {
                if std::env::var(DEVICE_ENV_VAR).is_err() {
                    assert!(info.cuda_device_name.is_none());
                }
            }
            Device::Cuda => {}
        }
    }
}
