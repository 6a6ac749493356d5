//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Actor, ProfileId, Role};

/// The acting user, carried in every appointment action body.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct ActorDto {
    /// Acting side of the marketplace.
    pub role: Role,
    /// Acting profile.
    pub profile_id: ProfileId,
}

impl From<ActorDto> for Actor {
    fn from(dto: ActorDto) -> Self {
        Self {
            role: dto.role,
            profile_id: dto.profile_id,
        }
    }
}

/// Query parameter selecting the viewer's role.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleParams {
    /// Role to compute permitted actions for. Defaults to `customer`.
    #[serde(default = "default_role")]
    pub role: Role,
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

impl PaginationMeta {
    /// Clamps the requested page and size and slices `items` accordingly.
    #[must_use]
    pub fn paginate<T>(items: Vec<T>, page: u32, per_page: u32) -> (Vec<T>, Self) {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let total_pages = total.div_ceil(per_page);
        let skip = usize::try_from(page.saturating_sub(1).saturating_mul(per_page))
            .unwrap_or(usize::MAX);
        let data = items
            .into_iter()
            .skip(skip)
            .take(per_page as usize)
            .collect();
        (
            data,
            Self {
                page,
                per_page,
                total,
                total_pages,
            },
        )
    }
}

pub(crate) const fn default_role() -> Role {
    Role::Customer
}

pub(crate) const fn default_page() -> u32 {
    1
}

pub(crate) const fn default_per_page() -> u32 {
    20
}
