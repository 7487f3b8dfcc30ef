/*!
Status codes and the raw driver code translator.

Every vendor call reports its result as an opaque unsigned integer. This
module is the only place those integers are interpreted: [`translate`]
maps each raw code onto a [`StatusCode`], keeping the raw value for
anything that is a hardware fault or that we do not recognise.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw return codes reported by the vendor driver (`atmcd` numbering).
pub mod codes {
    pub const DRV_ERROR_CODES: u32 = 20001;
    pub const DRV_SUCCESS: u32 = 20002;
    pub const DRV_VXDNOTINSTALLED: u32 = 20003;
    pub const DRV_ERROR_SCAN: u32 = 20004;
    pub const DRV_ERROR_CHECK_SUM: u32 = 20005;
    pub const DRV_ERROR_FILELOAD: u32 = 20006;
    pub const DRV_UNKNOWN_FUNCTION: u32 = 20007;
    pub const DRV_ERROR_VXD_INIT: u32 = 20008;
    pub const DRV_ERROR_ADDRESS: u32 = 20009;
    pub const DRV_ERROR_PAGELOCK: u32 = 20010;
    pub const DRV_ERROR_PAGEUNLOCK: u32 = 20011;
    pub const DRV_ERROR_BOARDTEST: u32 = 20012;
    pub const DRV_ERROR_ACK: u32 = 20013;
    pub const DRV_ERROR_UP_FIFO: u32 = 20014;
    pub const DRV_ERROR_PATTERN: u32 = 20015;
    pub const DRV_ACQUISITION_ERRORS: u32 = 20017;
    pub const DRV_ACQ_BUFFER: u32 = 20018;
    pub const DRV_ACQ_DOWNFIFO_FULL: u32 = 20019;
    pub const DRV_PROC_UNKONWN_INSTRUCTION: u32 = 20020;
    pub const DRV_ILLEGAL_OP_CODE: u32 = 20021;
    pub const DRV_KINETIC_TIME_NOT_MET: u32 = 20022;
    pub const DRV_ACCUM_TIME_NOT_MET: u32 = 20023;
    pub const DRV_NO_NEW_DATA: u32 = 20024;
    pub const DRV_SPOOLERROR: u32 = 20026;
    pub const DRV_TEMPERATURE_OFF: u32 = 20034;
    pub const DRV_TEMPERATURE_NOT_STABILIZED: u32 = 20035;
    pub const DRV_TEMPERATURE_STABILIZED: u32 = 20036;
    pub const DRV_TEMPERATURE_NOT_REACHED: u32 = 20037;
    pub const DRV_TEMPERATURE_OUT_RANGE: u32 = 20038;
    pub const DRV_TEMPERATURE_NOT_SUPPORTED: u32 = 20039;
    pub const DRV_TEMPERATURE_DRIFT: u32 = 20040;
    pub const DRV_GENERAL_ERRORS: u32 = 20049;
    pub const DRV_INVALID_AUX: u32 = 20050;
    pub const DRV_COF_NOTLOADED: u32 = 20051;
    pub const DRV_FPGAPROG: u32 = 20052;
    pub const DRV_FLEXERROR: u32 = 20053;
    pub const DRV_GPIBERROR: u32 = 20054;
    pub const DRV_DRIVER_ERRORS: u32 = 20065;
    pub const DRV_P1INVALID: u32 = 20066;
    pub const DRV_P2INVALID: u32 = 20067;
    pub const DRV_P3INVALID: u32 = 20068;
    pub const DRV_P4INVALID: u32 = 20069;
    pub const DRV_INIERROR: u32 = 20070;
    pub const DRV_COFERROR: u32 = 20071;
    pub const DRV_ACQUIRING: u32 = 20072;
    pub const DRV_IDLE: u32 = 20073;
    pub const DRV_TEMPCYCLE: u32 = 20074;
    pub const DRV_NOT_INITIALIZED: u32 = 20075;
    pub const DRV_P5INVALID: u32 = 20076;
    pub const DRV_P6INVALID: u32 = 20077;
    pub const DRV_INVALID_MODE: u32 = 20078;
    pub const DRV_INVALID_FILTER: u32 = 20079;
    pub const DRV_I2CERRORS: u32 = 20080;
    pub const DRV_I2CDEVNOTFOUND: u32 = 20081;
    pub const DRV_I2CTIMEOUT: u32 = 20082;
    pub const DRV_P7INVALID: u32 = 20083;
    pub const DRV_USBERROR: u32 = 20089;
    pub const DRV_IOCERROR: u32 = 20090;
    pub const DRV_VRMVERSIONERROR: u32 = 20091;
    pub const DRV_USB_INTERRUPT_ENDPOINT_ERROR: u32 = 20093;
    pub const DRV_BINNING_ERROR: u32 = 20099;
    pub const DRV_ERROR_NOCAMERA: u32 = 20990;
    pub const DRV_NOT_SUPPORTED: u32 = 20991;
    pub const DRV_NOT_AVAILABLE: u32 = 20992;
}

/// Normalised outcome of any controller operation.
///
/// Besides the codes the driver can report, this also carries the
/// sequencing and configuration failures the controller detects itself
/// before touching the hardware.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "raw", rename_all = "snake_case")]
pub enum StatusCode {
    #[error("success")]
    Success,

    #[error("device idle")]
    Idle,

    #[error("driver not initialized")]
    NotInitialized,

    #[error("acquisition in progress")]
    AcquisitionInProgress,

    #[error("timed out waiting for the device")]
    Timeout,

    #[error("invalid image dimensions")]
    InvalidDimensions,

    #[error("hardware error (raw code {0})")]
    HardwareError(u32),

    #[error("value out of range")]
    OutOfRange,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("acquisition configuration incomplete")]
    InvalidConfig,

    #[error("operation not valid in the current state")]
    InvalidTransition,

    #[error("acquisition already running or not armed")]
    AlreadyAcquiring,

    #[error("acquisition not configured")]
    NotConfigured,

    #[error("session busy")]
    SessionBusy,

    #[error("no acquisition to abort")]
    NotAcquiring,

    #[error("acquisition aborted")]
    Aborted,

    #[error("session already open")]
    AlreadyOpen,

    #[error("session not open")]
    NotOpen,

    #[error("cooler off")]
    TemperatureOff,

    #[error("temperature not reached")]
    TemperatureNotReached,

    #[error("temperature reached but not stabilized")]
    TemperatureNotStabilized,

    #[error("temperature stabilized")]
    TemperatureStabilized,

    #[error("temperature drifted from target")]
    TemperatureDrift,

    #[error("unrecognised driver code {0}")]
    Unknown(u32),
}

impl StatusCode {
    /// Raw driver value preserved for diagnostics, if this code carries one.
    pub fn raw(self) -> Option<u32> {
        match self {
            Self::HardwareError(raw) | Self::Unknown(raw) => Some(raw),
            _ => None,
        }
    }

    /// `Timeout` is the only code a caller is invited to retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Codes reported by a successful temperature query.
    pub fn is_thermal_report(self) -> bool {
        matches!(
            self,
            Self::TemperatureOff
                | Self::TemperatureNotReached
                | Self::TemperatureNotStabilized
                | Self::TemperatureStabilized
                | Self::TemperatureDrift
        )
    }

    /// Codes that report device trouble rather than a caller mistake.
    pub fn is_hardware_fault(self) -> bool {
        matches!(self, Self::HardwareError(_) | Self::Unknown(_) | Self::NotInitialized)
    }
}

/// Translate a raw driver return code.
pub fn translate(raw: u32) -> StatusCode {
    use codes::*;

    match raw {
        DRV_SUCCESS => StatusCode::Success,
        DRV_IDLE => StatusCode::Idle,
        DRV_ACQUIRING => StatusCode::AcquisitionInProgress,
        DRV_NOT_INITIALIZED => StatusCode::NotInitialized,
        DRV_NO_NEW_DATA => StatusCode::Timeout,

        DRV_TEMPERATURE_OFF => StatusCode::TemperatureOff,
        DRV_TEMPERATURE_NOT_STABILIZED => StatusCode::TemperatureNotStabilized,
        DRV_TEMPERATURE_STABILIZED => StatusCode::TemperatureStabilized,
        DRV_TEMPERATURE_NOT_REACHED => StatusCode::TemperatureNotReached,
        DRV_TEMPERATURE_DRIFT => StatusCode::TemperatureDrift,
        DRV_TEMPERATURE_OUT_RANGE => StatusCode::OutOfRange,

        DRV_P1INVALID | DRV_P2INVALID | DRV_P3INVALID | DRV_P4INVALID | DRV_P5INVALID
        | DRV_P6INVALID | DRV_P7INVALID | DRV_INVALID_MODE => StatusCode::InvalidArgument,

        DRV_BINNING_ERROR => StatusCode::InvalidDimensions,

        DRV_ERROR_CODES
        | DRV_VXDNOTINSTALLED
        | DRV_ERROR_SCAN
        | DRV_ERROR_CHECK_SUM
        | DRV_ERROR_FILELOAD
        | DRV_UNKNOWN_FUNCTION
        | DRV_ERROR_VXD_INIT
        | DRV_ERROR_ADDRESS
        | DRV_ERROR_PAGELOCK
        | DRV_ERROR_PAGEUNLOCK
        | DRV_ERROR_BOARDTEST
        | DRV_ERROR_ACK
        | DRV_ERROR_UP_FIFO
        | DRV_ERROR_PATTERN
        | DRV_ACQUISITION_ERRORS
        | DRV_ACQ_BUFFER
        | DRV_ACQ_DOWNFIFO_FULL
        | DRV_PROC_UNKONWN_INSTRUCTION
        | DRV_ILLEGAL_OP_CODE
        | DRV_KINETIC_TIME_NOT_MET
        | DRV_ACCUM_TIME_NOT_MET
        | DRV_SPOOLERROR
        | DRV_TEMPERATURE_NOT_SUPPORTED
        | DRV_GENERAL_ERRORS
        | DRV_INVALID_AUX
        | DRV_COF_NOTLOADED
        | DRV_FPGAPROG
        | DRV_FLEXERROR
        | DRV_GPIBERROR
        | DRV_DRIVER_ERRORS
        | DRV_INIERROR
        | DRV_COFERROR
        | DRV_TEMPCYCLE
        | DRV_INVALID_FILTER
        | DRV_I2CERRORS
        | DRV_I2CDEVNOTFOUND
        | DRV_I2CTIMEOUT
        | DRV_USBERROR
        | DRV_IOCERROR
        | DRV_VRMVERSIONERROR
        | DRV_USB_INTERRUPT_ENDPOINT_ERROR
        | DRV_ERROR_NOCAMERA
        | DRV_NOT_SUPPORTED
        | DRV_NOT_AVAILABLE => StatusCode::HardwareError(raw),

        other => StatusCode::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::codes::*;
    use super::*;

    #[test]
    fn test_core_codes() {
        assert_eq!(translate(DRV_SUCCESS), StatusCode::Success);
        assert_eq!(translate(DRV_NOT_INITIALIZED), StatusCode::NotInitialized);
        assert_eq!(translate(DRV_ACQUIRING), StatusCode::AcquisitionInProgress);
        assert_eq!(translate(DRV_NO_NEW_DATA), StatusCode::Timeout);
        assert_eq!(translate(DRV_BINNING_ERROR), StatusCode::InvalidDimensions);
        assert_eq!(translate(DRV_TEMPERATURE_OUT_RANGE), StatusCode::OutOfRange);
        assert_eq!(translate(DRV_P3INVALID), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_hardware_errors_keep_raw_value() {
        let code = translate(DRV_ERROR_ACK);
        assert_eq!(code, StatusCode::HardwareError(DRV_ERROR_ACK));
        assert_eq!(code.raw(), Some(20013));
        assert!(code.is_hardware_fault());
    }

    #[test]
    fn test_unknown_codes_are_never_dropped() {
        for raw in [0, 1, 20000, 20016, 20999, u32::MAX] {
            let code = translate(raw);
            assert_eq!(code, StatusCode::Unknown(raw));
            assert_eq!(code.raw(), Some(raw));
            assert!(code.to_string().contains(&raw.to_string()));
        }
    }

    #[test]
    fn test_thermal_reports() {
        for raw in [
            DRV_TEMPERATURE_OFF,
            DRV_TEMPERATURE_NOT_STABILIZED,
            DRV_TEMPERATURE_STABILIZED,
            DRV_TEMPERATURE_NOT_REACHED,
            DRV_TEMPERATURE_DRIFT,
        ] {
            assert!(translate(raw).is_thermal_report(), "raw {raw}");
        }
        assert!(!translate(DRV_TEMPERATURE_OUT_RANGE).is_thermal_report());
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(StatusCode::Timeout.is_retryable());
        assert!(!StatusCode::HardwareError(DRV_ERROR_ACK).is_retryable());
        assert!(!StatusCode::InvalidTransition.is_retryable());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(StatusCode::Unknown(42)).unwrap();
        assert_eq!(json, serde_json::json!({ "code": "unknown", "raw": 42 }));

        let json = serde_json::to_value(StatusCode::Timeout).unwrap();
        assert_eq!(json, serde_json::json!({ "code": "timeout" }));
    }
}
