use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use uuid::Uuid;

/// Environment reported when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";
pub const DEPLOYMENT_ENVIRONMENT_NAME: &str = "deployment.environment.name";

static INSTANCE_ID: OnceLock<Uuid> = OnceLock::new();

/// Random instance id, generated on first use and stable for the life of the process.
pub fn process_instance_id() -> Uuid {
    *INSTANCE_ID.get_or_init(Uuid::new_v4)
}

/// Identity stamped on every exported span, metric and log record.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    service_name: String,
    service_version: String,
    instance_id: Uuid,
    environment: String,
    resource: Resource,
}

impl ResourceDescriptor {
    pub fn new(service_name: &str, service_version: &str, environment: Option<&str>) -> Self {
        let environment = match environment.map(str::trim) {
            Some(env) if !env.is_empty() => env.to_string(),
            _ => DEFAULT_ENVIRONMENT.to_string(),
        };
        let instance_id = process_instance_id();

        let resource = Resource::builder()
            .with_service_name(service_name.to_string())
            .with_attributes([
                KeyValue::new(SERVICE_VERSION, service_version.to_string()),
                KeyValue::new(SERVICE_INSTANCE_ID, instance_id.to_string()),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment.clone()),
            ])
            .build();

        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            instance_id,
            environment,
            resource,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The SDK resource shared by all three providers.
    pub fn resource(&self) -> Resource {
        self.resource.clone()
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.resource
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, value)| value.to_string())
    }
}
