// ==========================================
// 制造执行系统 (MES) - 资源目录服务
// ==========================================
// 作业员 / 设备 / SMT 设备 / 产线 / 工艺路线 / 标准产能
// ==========================================

use crate::db::SharedConnection;
use crate::domain::resource::{Equipment, Operator, ProductionLine, SmtEquipment};
use crate::domain::route::{sort_route, ProductRoute};
use crate::engine::error::ScheduleResult;
use crate::engine::ports::ResourceQuery;
use crate::repository::{ResourceRepository, RouteRepository};
use tracing::warn;

pub struct CatalogService {
    resources: ResourceRepository,
    routes: RouteRepository,
    /// 配置的默认产线名称
    default_line: Option<String>,
}

impl CatalogService {
    pub fn new(conn: SharedConnection, default_line: Option<String>) -> Self {
        Self {
            resources: ResourceRepository::new(conn.clone()),
            routes: RouteRepository::new(conn),
            default_line,
        }
    }

    pub fn resources(&self) -> &ResourceRepository {
        &self.resources
    }

    pub fn routes(&self) -> &RouteRepository {
        &self.routes
    }
}

impl ResourceQuery for CatalogService {
    fn operators(&self) -> ScheduleResult<Vec<Operator>> {
        Ok(self.resources.list_active_operators()?)
    }

    fn equipment(&self) -> ScheduleResult<Vec<Equipment>> {
        Ok(self.resources.list_active_equipment()?)
    }

    fn smt_equipment(&self) -> ScheduleResult<Vec<SmtEquipment>> {
        Ok(self.resources.list_active_smt_equipment()?)
    }

    fn route(&self, product_code: &str) -> ScheduleResult<Vec<ProductRoute>> {
        let mut steps = self.routes.find_route(product_code)?;
        sort_route(&mut steps);
        Ok(steps)
    }

    fn capacity_per_hour(&self, product_code: &str, process_name: &str) -> ScheduleResult<f64> {
        Ok(self.routes.standard_capacity(product_code, process_name)?)
    }

    fn production_line(&self, name: Option<&str>) -> ScheduleResult<ProductionLine> {
        let wanted = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or(self.default_line.as_deref());
        if let Some(wanted) = wanted {
            match self.resources.find_line_by_name(wanted)? {
                Some(line) if line.is_active => return Ok(line),
                _ => warn!(line = wanted, "指定产线不存在或未启用，改用默认产线"),
            }
        }
        Ok(self
            .resources
            .list_active_lines()?
            .into_iter()
            .next()
            .unwrap_or_else(ProductionLine::builtin_default))
    }
}
