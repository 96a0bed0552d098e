use service_core::error::AppError;
use thiserror::Error;

/// Domain failures of the workflow layer. Converted to `AppError` at the
/// boundary so callers see one error surface.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("This group already exists")]
    GroupAlreadyExists,

    #[error("Group {0} is not found")]
    GroupNotFound(String),

    #[error("Member group {0} not found")]
    MemberGroupNotFound(String),

    #[error("{member} is already a member of group {group}")]
    AlreadyMember { member: String, group: String },

    #[error(
        "Group {group} does not have {member} as a direct child/member. Please check the group \
         hierarchy for an explicit member declaration."
    )]
    NotDirectChild { group: String, member: String },

    #[error("Group can only be MEMBER of another group")]
    GroupOwnerNotAllowed,

    #[error("Cyclic membership is not allowed")]
    CyclicMembership,

    #[error("{member}'s group quota hit. Identity can't belong to more than {limit} groups")]
    GroupQuotaExceeded { member: String, limit: usize },

    #[error("Not authorized to manage members")]
    NotAuthorized,

    #[error("Users data root group hierarchy is enforced, member users.data.root cannot be removed")]
    DataRootRemoval,

    #[error(
        "Member {member} cannot be removed from elementary data partition group {group}, since \
         the user is still provisioned inside other groups. Please use Delete Member API to \
         remove the user from all the groups."
    )]
    RootUsersGroupRemoval { member: String, group: String },

    #[error("Invalid group, group update API cannot work with bootstrapped groups")]
    BootstrapGroupUpdate,

    #[error("Invalid group, bootstrap groups are not allowed to be deleted")]
    BootstrapGroupDeletion,

    #[error("Invalid group, given group email : \"{0}\" is a data group")]
    DataGroupRename(String),

    #[error("Invalid group name : \"{0}\", it already exists")]
    GroupNameTaken(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::GroupAlreadyExists => AppError::Conflict(anyhow::anyhow!("{}", err)),
            ServiceError::GroupNotFound(_) => AppError::NotFound(anyhow::anyhow!("{}", err)),
            ServiceError::MemberGroupNotFound(_) => AppError::NotFound(anyhow::anyhow!("{}", err)),
            ServiceError::AlreadyMember { .. } => AppError::Conflict(anyhow::anyhow!("{}", err)),
            ServiceError::NotDirectChild { .. } => AppError::NotFound(anyhow::anyhow!("{}", err)),
            ServiceError::GroupOwnerNotAllowed => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::CyclicMembership => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::GroupQuotaExceeded { .. } => {
                AppError::QuotaExceeded(anyhow::anyhow!("{}", err))
            }
            ServiceError::NotAuthorized => AppError::Unauthorized(anyhow::anyhow!("{}", err)),
            ServiceError::DataRootRemoval => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::RootUsersGroupRemoval { .. } => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            ServiceError::BootstrapGroupUpdate => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::BootstrapGroupDeletion => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::DataGroupRename(_) => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::GroupNameTaken(_) => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
