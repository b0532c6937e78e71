//! 请求/响应 DTO 定义

pub mod request;
pub mod response;

pub use request::{
    CreateRuleRequest, ExecuteRunRequest, FlagListParams, PaginationParams, ReviewRequest,
    RuleListParams, UpdateRuleRequest,
};
pub use response::{
    ApiResponse, BulkUploadDto, FlagDto, PageResponse, RuleDto, RuleVersionDto, RunDetailDto,
    RunDto,
};
