//! # Service Broker
//!
//! Open Service Broker API operations over the instance store.
//!
//! Every mutating request only records intent: the store marks the instance in progress
//! and the controller completes the operation in the background. Clients poll
//! `last_operation` for the result, so every mutation requires `accepts_incomplete=true`.
//!
//! Bindings carry no state of their own and hand out empty credentials.

mod error;
mod schema;
mod types;

pub use error::{BrokerError, MissingInstance};
pub use schema::{ParametersSchema, SchemaError};
pub use types::*;

use crate::config::BrokerConfig;
use crate::crd::{OperationPhase, OperationType};
use crate::storage::InstanceStorage;
use serde_json::Value;
use tracing::{info, instrument};

pub struct Broker {
    storage: InstanceStorage,
    config: BrokerConfig,
    schema: Option<ParametersSchema>,
}

impl Broker {
    /// Fails when the configured parameters schema does not compile
    pub fn new(storage: InstanceStorage, config: BrokerConfig) -> Result<Self, SchemaError> {
        let schema = config
            .parameters_schema
            .clone()
            .map(ParametersSchema::compile)
            .transpose()?;
        Ok(Self {
            storage,
            config,
            schema,
        })
    }

    /// One bindable service with one plan
    pub fn catalog(&self) -> Catalog {
        let schemas = self.schema.as_ref().map(|schema| {
            let parameters = Schema {
                parameters: schema.document().clone(),
            };
            Schemas {
                service_instance: ServiceInstanceSchema {
                    create: parameters.clone(),
                    update: parameters,
                },
            }
        });
        Catalog {
            services: vec![Service {
                id: self.config.service_id.clone(),
                name: self.config.service_name.clone(),
                description: self.config.service_description.clone(),
                bindable: true,
                plan_updateable: false,
                plans: vec![ServicePlan {
                    id: self.config.plan_id.clone(),
                    name: self.config.plan_name.clone(),
                    description: self.config.plan_description.clone(),
                    schemas,
                }],
            }],
        }
    }

    #[instrument(name = "broker.create", skip(self, request))]
    pub async fn create_service_instance(
        &self,
        instance_id: &str,
        accepts_incomplete: bool,
        request: CreateServiceInstanceRequest,
    ) -> Result<OperationResponse, BrokerError> {
        self.validate_service_plan(&request.service_id, Some(&request.plan_id))?;
        require_async(accepts_incomplete)?;
        let parameters = self.parse_parameters(request.parameters)?;

        self.storage
            .create_instance(instance_id, parameters)
            .await
            .map_err(|e| BrokerError::from_storage(e, MissingInstance::NotFound))?;
        info!("Accepted create of instance {}", instance_id);
        Ok(OperationResponse::accepted(OperationType::Create.token()))
    }

    #[instrument(name = "broker.update", skip(self, request))]
    pub async fn update_service_instance(
        &self,
        instance_id: &str,
        accepts_incomplete: bool,
        request: UpdateServiceInstanceRequest,
    ) -> Result<OperationResponse, BrokerError> {
        self.validate_service_plan(&request.service_id, request.plan_id.as_deref())?;
        require_async(accepts_incomplete)?;
        let parameters = self.parse_parameters(request.parameters)?;

        let updated = self
            .storage
            .update_instance(instance_id, parameters)
            .await
            .map_err(|e| BrokerError::from_storage(e, MissingInstance::NotFound))?;
        if !updated {
            return Ok(OperationResponse::completed());
        }
        info!("Accepted update of instance {}", instance_id);
        Ok(OperationResponse::accepted(OperationType::Update.token()))
    }

    #[instrument(name = "broker.delete", skip(self))]
    pub async fn remove_service_instance(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
        accepts_incomplete: bool,
    ) -> Result<OperationResponse, BrokerError> {
        self.validate_service_plan(service_id, Some(plan_id))?;
        require_async(accepts_incomplete)?;

        self.storage
            .delete_instance(instance_id)
            .await
            .map_err(|e| BrokerError::from_storage(e, MissingInstance::Gone))?;
        info!("Accepted delete of instance {}", instance_id);
        Ok(OperationResponse::accepted(OperationType::Delete.token()))
    }

    /// Status of the last operation on `instance_id`.
    ///
    /// A missing instance is reported as gone, which is also how a finished delete looks.
    ///
    /// `service_id` and `plan_id` are optional query parameters, checked when sent.
    pub async fn last_operation(
        &self,
        instance_id: &str,
        service_id: Option<&str>,
        plan_id: Option<&str>,
        operation: &str,
    ) -> Result<LastOperationResponse, BrokerError> {
        if let Some(service_id) = service_id {
            self.validate_service_plan(service_id, plan_id)?;
        } else if let Some(plan_id) = plan_id {
            self.validate_plan(plan_id)?;
        }
        if operation.is_empty() {
            return Err(BrokerError::BadRequest("operation must be specified".to_string()));
        }

        let record = self
            .storage
            .get_instance(instance_id)
            .await
            .map_err(|e| BrokerError::from_storage(e, MissingInstance::Gone))?;

        let state = match record.state.phase {
            OperationPhase::InProgress => LastOperationState::InProgress,
            OperationPhase::Succeeded => LastOperationState::Succeeded,
            OperationPhase::Failed => LastOperationState::Failed,
        };
        let description = match (state, record.error) {
            (LastOperationState::Failed, Some(error)) => error,
            _ => record.state.to_string(),
        };
        Ok(LastOperationResponse {
            state,
            description: Some(description),
        })
    }

    #[instrument(name = "broker.bind", skip(self, request))]
    pub fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        request: &BindRequest,
    ) -> Result<BindResponse, BrokerError> {
        self.validate_service_plan(&request.service_id, Some(&request.plan_id))?;
        info!("Bound {} to instance {}", binding_id, instance_id);
        Ok(BindResponse::default())
    }

    #[instrument(name = "broker.unbind", skip(self))]
    pub fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        service_id: &str,
        plan_id: &str,
    ) -> Result<(), BrokerError> {
        self.validate_service_plan(service_id, Some(plan_id))?;
        info!("Unbound {} from instance {}", binding_id, instance_id);
        Ok(())
    }

    fn validate_service_plan(
        &self,
        service_id: &str,
        plan_id: Option<&str>,
    ) -> Result<(), BrokerError> {
        if service_id != self.config.service_id {
            return Err(BrokerError::BadRequest(format!(
                "unknown service id {service_id:?}"
            )));
        }
        plan_id.map_or(Ok(()), |plan_id| self.validate_plan(plan_id))
    }

    fn validate_plan(&self, plan_id: &str) -> Result<(), BrokerError> {
        if plan_id != self.config.plan_id {
            return Err(BrokerError::BadRequest(format!("unknown plan id {plan_id:?}")));
        }
        Ok(())
    }

    /// Parameters are required, must be a JSON object and must satisfy the plan schema
    fn parse_parameters(&self, parameters: Option<Value>) -> Result<Value, BrokerError> {
        let parameters = match parameters {
            None | Some(Value::Null) => {
                return Err(BrokerError::BadRequest("parameters is required".to_string()))
            }
            Some(value @ Value::Object(_)) => value,
            Some(_) => {
                return Err(BrokerError::BadRequest(
                    "parameters must be a JSON object".to_string(),
                ))
            }
        };
        if let Some(schema) = &self.schema {
            schema.validate(&parameters)?;
        }
        Ok(parameters)
    }
}

fn require_async(accepts_incomplete: bool) -> Result<(), BrokerError> {
    if accepts_incomplete {
        Ok(())
    } else {
        Err(BrokerError::AsyncRequired)
    }
}
