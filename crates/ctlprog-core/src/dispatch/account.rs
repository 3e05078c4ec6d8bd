use crate::{
    accounts::AccountService,
    common::{
        error::{Error, Result},
        types::{AccountRequest, ControlProgram},
    },
};

/// Creates a control program for the account named by `req`.
///
/// A non-empty `account_id` is used as is and the alias is ignored. Otherwise
/// the alias is resolved through the account service first. Programs created
/// through the batch endpoint are never exclusive.
pub async fn create_account_control_program<A>(
    accounts: &A,
    req: &AccountRequest,
) -> Result<ControlProgram>
where
    A: AccountService,
{
    let account_id = match (non_empty(&req.account_id), non_empty(&req.account_alias)) {
        (Some(id), _) => id.to_string(),
        (None, Some(alias)) => {
            tracing::trace!(alias, "resolving account alias");
            accounts.resolve_account_id(alias).await?
        }
        (None, None) => {
            return Err(Error::InvalidRequest {
                reason: "account_id or account_alias is required".to_string(),
            });
        }
    };

    accounts.create_control_program(&account_id, false).await
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, MemoryAccounts};

    #[tokio::test]
    async fn id_takes_precedence_over_alias() {
        let accounts = MemoryAccounts::from_pairs([("treasury", "acc-1")]);
        accounts.insert_id("acc-2");

        let req = AccountRequest {
            account_id: Some("acc-2".to_string()),
            account_alias: Some("treasury".to_string()),
        };
        let program = create_account_control_program(&accounts, &req).await.unwrap();
        assert_eq!(program.account_id, "acc-2");
    }

    #[tokio::test]
    async fn empty_id_falls_back_to_alias() {
        let accounts = MemoryAccounts::from_pairs([("treasury", "acc-1")]);

        let req = AccountRequest {
            account_id: Some(String::new()),
            account_alias: Some("treasury".to_string()),
        };
        let program = create_account_control_program(&accounts, &req).await.unwrap();
        assert_eq!(program.account_id, "acc-1");
    }

    #[tokio::test]
    async fn neither_field_is_invalid() {
        let accounts = MemoryAccounts::new();
        let err = create_account_control_program(&accounts, &AccountRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
