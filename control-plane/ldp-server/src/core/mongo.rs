use std::sync::Arc;

use async_trait::async_trait;
use ldp_models::{
    ManagedService, ManagedServiceType, MongoDbRole, MongoDbRoleName,
    MongoDbUser, ServiceHealth,
};
use ldp_storage::Storage;
use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use tracing::{debug, info};

use crate::core::managed::{password_secret_name, type_params};
use crate::core::{Authentication, ManagedServices};
use crate::errors::{ServerError, ServerResult};

#[async_trait]
pub trait MongoDbMgmt: Send + Sync {
    async fn get_mongodb_users(
        &self,
        service_id: i32,
        auth: &Authentication,
    ) -> ServerResult<Vec<MongoDbUser>>;
    async fn get_mongodb_user(
        &self,
        service_id: i32,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser>;
    async fn create_mongodb_user(
        &self,
        service_id: i32,
        user: MongoDbUser,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser>;
    async fn update_mongodb_user(
        &self,
        service_id: i32,
        user: MongoDbUser,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser>;
    async fn delete_mongodb_user(
        &self,
        service_id: i32,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()>;
}

pub struct MongoDbMgmtImpl {
    managed_services: Arc<dyn ManagedServices>,
    storage: Storage,
}

pub fn init_mongodb_mgmt(
    managed_services: Arc<dyn ManagedServices>,
    storage: Storage,
) -> Arc<MongoDbMgmtImpl> {
    Arc::new(MongoDbMgmtImpl {
        managed_services,
        storage,
    })
}

fn admin_username() -> &'static str {
    type_params(ManagedServiceType::Mongo).username
}

fn roles_to_bson(roles: &[MongoDbRole]) -> Bson {
    Bson::Array(
        roles
            .iter()
            .map(|r| {
                Bson::Document(doc! {
                    "role": r.role.as_str(),
                    "db": r.db.as_str(),
                })
            })
            .collect(),
    )
}

fn user_from_document(user: &Document) -> ServerResult<MongoDbUser> {
    let username = user
        .get_str("user")
        .map_err(|err| {
            ServerError::internal_wrap(err, "malformed usersInfo reply")
        })?
        .to_string();
    let roles = user
        .get_array("roles")
        .map(|roles| {
            roles
                .iter()
                .filter_map(|role| role.as_document())
                .filter_map(|role| {
                    let db = role.get_str("db").ok()?;
                    let name =
                        MongoDbRoleName::parse(role.get_str("role").ok()?)?;
                    Some(MongoDbRole {
                        db: db.to_string(),
                        role: name,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(MongoDbUser {
        username,
        password_secret: None,
        roles,
    })
}

impl MongoDbMgmtImpl {
    /// The managed service must be a Mongo instance that currently
    /// reports Available; everything else is a client error.
    async fn get_mongodb_service(
        &self,
        service_id: i32,
        auth: &Authentication,
    ) -> ServerResult<ManagedService> {
        let service = self
            .managed_services
            .get_managed_service(service_id, auth)
            .await?;
        if service.service_type != ManagedServiceType::Mongo {
            return Err(ServerError::bad_request(
                "Managed service is not MongoDB",
            ));
        }
        let status = self
            .managed_services
            .get_managed_service_status(service_id, auth)
            .await?;
        if status.status != ServiceHealth::Available {
            return Err(ServerError::bad_request("MongoDB is not available"));
        }
        Ok(service)
    }

    async fn connect(&self, service: &ManagedService) -> ServerResult<Client> {
        let params = type_params(ManagedServiceType::Mongo);
        let host = format!(
            "{}.{}.svc.cluster.local",
            service.name, service.project
        );
        let secret = self
            .storage
            .secrets()
            .find_by_project_id_and_name(
                &service.project,
                &password_secret_name(&service.name),
            )
            .await?;
        let credential = Credential::builder()
            .username(params.username.to_string())
            .password(secret.value)
            .build();
        let options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host,
                port: Some(params.pod_port as u16),
            }])
            .credential(credential)
            .build();
        Ok(Client::with_options(options)?)
    }

    async fn get_user_info(
        &self,
        client: &Client,
        username: &str,
    ) -> ServerResult<MongoDbUser> {
        let reply = client
            .database("admin")
            .run_command(doc! {
                "usersInfo": username,
                "showPrivileges": true,
            })
            .await?;
        let users = reply.get_array("users").map_err(|err| {
            ServerError::internal_wrap(err, "malformed usersInfo reply")
        })?;
        let first = users
            .iter()
            .filter_map(|u| u.as_document())
            .next()
            .ok_or_else(|| {
                ServerError::not_found(format!("User {username} not found"))
            })?;
        user_from_document(first)
    }

    async fn resolve_password(
        &self,
        service: &ManagedService,
        secret_name: &str,
    ) -> ServerResult<String> {
        let secret = self
            .storage
            .secrets()
            .find_by_project_id_and_name(&service.project, secret_name)
            .await?;
        Ok(secret.value)
    }
}

#[async_trait]
impl MongoDbMgmt for MongoDbMgmtImpl {
    async fn get_mongodb_users(
        &self,
        service_id: i32,
        auth: &Authentication,
    ) -> ServerResult<Vec<MongoDbUser>> {
        let service = self.get_mongodb_service(service_id, auth).await?;
        let client = self.connect(&service).await?;

        // MongoDB does not return privileges for the all-users form.
        let reply = client
            .database("admin")
            .run_command(doc! { "usersInfo": 1 })
            .await?;
        let listed = reply.get_array("users").map_err(|err| {
            ServerError::internal_wrap(err, "malformed usersInfo reply")
        })?;

        let mut users = Vec::new();
        for user in listed.iter().filter_map(|u| u.as_document()) {
            let username = user.get_str("user").map_err(|err| {
                ServerError::internal_wrap(err, "malformed usersInfo reply")
            })?;
            if username == admin_username() {
                continue;
            }
            match self.get_user_info(&client, username).await {
                Ok(user) => users.push(user),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        users.sort_by(|a, b| a.username.cmp(&b.username));
        debug!(service = %service.name, project = %service.project, "retrieved MongoDB users");
        Ok(users)
    }

    async fn get_mongodb_user(
        &self,
        service_id: i32,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser> {
        let service = self.get_mongodb_service(service_id, auth).await?;
        let client = self.connect(&service).await?;
        if username == admin_username() {
            return Err(ServerError::not_found(format!(
                "User {username} not found"
            )));
        }
        self.get_user_info(&client, username).await
    }

    async fn create_mongodb_user(
        &self,
        service_id: i32,
        user: MongoDbUser,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser> {
        let service = self.get_mongodb_service(service_id, auth).await?;
        let client = self.connect(&service).await?;

        if user.username == admin_username() {
            return Err(ServerError::forbidden(format!(
                "Cannot create user with username '{}'",
                admin_username()
            )));
        }
        match self.get_user_info(&client, &user.username).await {
            Ok(_) => {
                return Err(ServerError::bad_request(format!(
                    "User {} already exists",
                    user.username
                )));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        let secret_name = user.password_secret.as_deref().ok_or_else(|| {
            ServerError::bad_request("passwordSecret should be provided")
        })?;
        let password = self.resolve_password(&service, secret_name).await?;

        client
            .database("admin")
            .run_command(doc! {
                "createUser": user.username.as_str(),
                "pwd": password,
                "roles": roles_to_bson(&user.roles),
            })
            .await?;
        info!(service = %service.name, project = %service.project, username = %user.username, "MongoDB user created");
        Ok(user)
    }

    async fn update_mongodb_user(
        &self,
        service_id: i32,
        user: MongoDbUser,
        auth: &Authentication,
    ) -> ServerResult<MongoDbUser> {
        let service = self.get_mongodb_service(service_id, auth).await?;
        let client = self.connect(&service).await?;

        if user.username == admin_username() {
            return Err(ServerError::forbidden(format!(
                "Cannot update user with username '{}'",
                admin_username()
            )));
        }
        self.get_user_info(&client, &user.username).await?;

        // Without a password secret only the role set changes.
        let command = match user.password_secret.as_deref() {
            Some(secret_name) => {
                let password =
                    self.resolve_password(&service, secret_name).await?;
                doc! {
                    "updateUser": user.username.as_str(),
                    "pwd": password,
                    "roles": roles_to_bson(&user.roles),
                }
            }
            None => doc! {
                "updateUser": user.username.as_str(),
                "roles": roles_to_bson(&user.roles),
            },
        };
        client.database("admin").run_command(command).await?;
        info!(service = %service.name, project = %service.project, username = %user.username, "MongoDB user updated");
        Ok(user)
    }

    async fn delete_mongodb_user(
        &self,
        service_id: i32,
        username: &str,
        auth: &Authentication,
    ) -> ServerResult<()> {
        let service = self.get_mongodb_service(service_id, auth).await?;
        let client = self.connect(&service).await?;

        match self.get_user_info(&client, username).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        if username == admin_username() {
            return Err(ServerError::forbidden(format!(
                "Cannot delete user with username '{}'",
                admin_username()
            )));
        }
        client
            .database("admin")
            .run_command(doc! { "dropUser": username })
            .await?;
        info!(service = %service.name, project = %service.project, username, "MongoDB user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_in_command_order() {
        let roles = vec![MongoDbRole {
            db: "app".into(),
            role: MongoDbRoleName::ReadWrite,
        }];
        let bson = roles_to_bson(&roles);
        let Bson::Array(items) = bson else {
            panic!("expected array");
        };
        let Bson::Document(doc) = &items[0] else {
            panic!("expected document");
        };
        assert_eq!(doc.get_str("role").unwrap(), "readWrite");
        assert_eq!(doc.get_str("db").unwrap(), "app");
    }

    #[test]
    fn user_parsing_keeps_known_roles_only() {
        let doc = doc! {
            "user": "alice",
            "roles": [
                { "role": "readWrite", "db": "app" },
                { "role": "clusterMonitor", "db": "admin" },
            ],
        };
        let user = user_from_document(&doc).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.roles.len(), 1);
        assert_eq!(user.roles[0].role, MongoDbRoleName::ReadWrite);
    }
}
