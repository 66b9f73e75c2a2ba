// ==========================================
// 制造执行系统 (MES) - 工艺路线与标准产能
// ==========================================

use serde::{Deserialize, Serialize};

/// 未维护标准产能时的默认值（件/小时）
pub const DEFAULT_CAPACITY_PER_HOUR: f64 = 1000.0;

// ==========================================
// ProductRoute - 产品工艺路线（单步）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRoute {
    pub id: i64,
    pub product_code: String,
    pub step_order: i32,
    pub process_name: String,
    /// 是否为 SMT 工序（使用 SMT 设备、不计午休）
    pub is_smt: bool,
}

// ==========================================
// ProductProcessStandardCapacity - 标准产能（版本化）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProcessStandardCapacity {
    pub id: i64,
    pub product_code: String,
    pub process_name: String,
    pub version: i32,
    pub standard_capacity_per_hour: f64,
    pub is_active: bool,
}

/// 将路线按 step_order 升序排列（同一产品内）
pub fn sort_route(steps: &mut [ProductRoute]) {
    steps.sort_by_key(|s| s.step_order);
}
