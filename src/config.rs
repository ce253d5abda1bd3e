//! 定义了桥接器的可配置参数。
//! Defines configurable parameters for the bridge.

use std::{fmt, time::Duration};

/// The name of the simulator variable carrying the push-to-talk flag.
/// 承载按键通话标志的模拟器变量名称。
pub const PTT_VARIABLE_NAME: &str = "DCF_VPILOT_PTT";

/// A structure containing all configurable parameters of the bridge.
///
/// 包含桥接器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// The client name announced to the host when connecting.
    /// 连接时向主机声明的客户端名称。
    pub client_name: String,

    /// The monitored simulator variable.
    /// 被监视的模拟器变量。
    pub variable: SimVariable,

    /// Connection and subscription parameters.
    /// 连接和订阅参数。
    pub connection: ConnectionConfig,

    /// Name given to the dedicated worker thread.
    /// 专用工作线程的名称。
    pub worker_thread_name: String,
}

/// The scope a simulator variable lives in.
///
/// 模拟器变量所在的作用域。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    /// A "local" variable, addressed as `L:<name>`.
    /// "本地"变量，以 `L:<name>` 寻址。
    Local,
    /// A built-in simulation variable, addressed by its bare name.
    /// 内置模拟变量，以其名称直接寻址。
    Simulation,
}

/// The wire type a variable is delivered as.
///
/// 变量在传输中的数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// A 32-bit little-endian integer.
    /// 32位小端整数。
    Int32,
}

impl DataType {
    /// Size in bytes of one encoded value.
    pub fn size(self) -> usize {
        match self {
            DataType::Int32 => 4,
        }
    }
}

/// A simulator variable definition.
///
/// 模拟器变量定义。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVariable {
    pub scope: VariableScope,
    pub name: String,
    pub units: String,
    pub data_type: DataType,
}

impl SimVariable {
    /// Returns the name as the host expects it, including the scope prefix.
    ///
    /// 返回主机期望的名称，包括作用域前缀。
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SimVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            VariableScope::Local => write!(f, "L:{}", self.name),
            VariableScope::Simulation => f.write_str(&self.name),
        }
    }
}

/// How often the host should check the variable for changes.
///
/// 主机检查变量变化的频率。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePeriod {
    /// Once per rendered frame, the host's native cadence.
    /// 每渲染帧一次，即主机的原生节奏。
    VisualFrame,
    /// Once per simulation step.
    /// 每个模拟步一次。
    SimFrame,
    /// Once per second.
    /// 每秒一次。
    Second,
}

/// Connection and subscription parameters.
///
/// 连接和订阅参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay between failed connect attempts. There is no growth and
    /// no retry limit.
    ///
    /// 连接尝试失败之间的固定延迟。不会增长，也没有重试上限。
    pub retry_interval: Duration,
    /// The cadence requested from the host.
    /// 向主机请求的更新节奏。
    pub update_period: UpdatePeriod,
    /// Ask the host to deliver changed values only.
    /// 要求主机仅传送发生变化的值。
    pub changed_only: bool,
    /// Write `false` to the variable after every (re)connect.
    /// 每次（重新）连接后向变量写入 `false`。
    pub reset_on_connect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: "PTT LVar Bridge".to_string(),
            variable: SimVariable::default(),
            connection: ConnectionConfig::default(),
            worker_thread_name: "ptt-bridge-worker".to_string(),
        }
    }
}

impl Default for SimVariable {
    fn default() -> Self {
        Self {
            scope: VariableScope::Local,
            name: PTT_VARIABLE_NAME.to_string(),
            units: "Bool".to_string(),
            data_type: DataType::Int32,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            update_period: UpdatePeriod::VisualFrame,
            changed_only: true,
            reset_on_connect: true,
        }
    }
}
