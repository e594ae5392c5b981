/// 质量判定滑动窗口默认长度（帧）
pub const DEFAULT_QUALITY_WINDOW: usize = 10;

/// 设备帧率下限（fps），低于此值视为设备不支持
pub const DEFAULT_FPS_THRESHOLD: f64 = 15.0;

/// 开始采集后首次检查帧率的延迟（毫秒）
pub const DEFAULT_FPS_CHECK_DELAY_MS: u64 = 5_000;

/// 帧率过低时的二次确认延迟（毫秒）
pub const DEFAULT_FPS_CONFIRM_DELAY_MS: u64 = 3_000;

/// 单次扫描的绝对超时（毫秒）
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 90_000;

/// 初始化序列（相机 → 跟踪器 → socket）最大尝试次数
pub const DEFAULT_INIT_ATTEMPTS: u32 = 3;

/// 初始化失败后的重试间隔（毫秒）
pub const DEFAULT_INIT_BACKOFF_MS: u64 = 2_000;

/// 眨眼检测区间下界（进度百分比，开区间）
pub const BLINK_CHECK_LOWER_PCT: f64 = 50.0;

/// 眨眼检测区间上界（进度百分比，开区间）
pub const BLINK_CHECK_UPPER_PCT: f64 = 90.0;

/// 上游服务以 "超过 100%" 作为校准完成标记
pub const PROGRESS_COMPLETE_PCT: f64 = 100.0;

/// 波形样本数超过此值后进入 "解读生命体征" 提示并显示图表
pub const SIGNAL_CHART_MIN_SAMPLES: usize = 50;

/// 压力指数 "尚无数据" 哨兵值
pub const STRESS_NO_DATA_SENTINEL: f64 = -1.0;

/// 会话更新广播通道容量
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// 默认提示语言
pub const DEFAULT_LANGUAGE: &str = "en";

/// 远端推理服务 websocket 地址
pub const DEFAULT_SOCKET_URL: &str = "wss://vm-production.xyz/vp/bgr_signal_socket";

/// 表单提交请求超时（秒）
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 15;

