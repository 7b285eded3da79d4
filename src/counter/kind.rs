//! Semaphore argument decoding.
//!
//! The guest packs several fields into one 32-bit semaphore argument. The hardware codes
//! are sparse, so each field is decoded through an explicit table; codes without an entry
//! decode to an `Unmapped` value that callers treat as a no-op.

/// Bit window of the operation field.
const OPERATION_MASK: u32 = 0x3;

/// Bit offset and width of the report counter type field.
const COUNTER_TYPE_SHIFT: u32 = 23;
const COUNTER_TYPE_MASK: u32 = 0x1f;

/// Semaphore operation selected by the low two bits of the argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreOperation {
    /// Write the configured payload.
    Release,
    /// Wait for a payload; the 3D engine does nothing here.
    Acquire,
    /// Write a counter record.
    Counter,
}

impl SemaphoreOperation {
    /// Decode the operation field of a raw semaphore argument.
    pub const fn decode(argument: u32) -> Option<Self> {
        match argument & OPERATION_MASK {
            0 => Some(Self::Release),
            1 => Some(Self::Acquire),
            2 => Some(Self::Counter),
            _ => None,
        }
    }
}

/// Counter that the guest asks to be written by a `Counter` semaphore operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportCounterType {
    Zero,
    InputVertices,
    InputPrimitives,
    VertexShaderInvocations,
    GeometryShaderInvocations,
    GeometryShaderPrimitives,
    ZcullStats0,
    TransformFeedbackPrimitivesWritten,
    ZcullStats1,
    ZcullStats2,
    ClipperInputPrimitives,
    ZcullStats3,
    ClipperOutputPrimitives,
    PrimitivesGenerated,
    FragmentShaderInvocations,
    SamplesPassed,
    TransformFeedbackOffset,
    TessControlShaderInvocations,
    TessEvaluationShaderInvocations,
    TessEvaluationShaderPrimitives,
}

/// Hardware code table for [`ReportCounterType`].
const REPORT_COUNTER_TABLE: &[(u32, ReportCounterType)] = &[
    (0x00, ReportCounterType::Zero),
    (0x01, ReportCounterType::InputVertices),
    (0x03, ReportCounterType::InputPrimitives),
    (0x05, ReportCounterType::VertexShaderInvocations),
    (0x07, ReportCounterType::GeometryShaderInvocations),
    (0x09, ReportCounterType::GeometryShaderPrimitives),
    (0x0a, ReportCounterType::ZcullStats0),
    (0x0b, ReportCounterType::TransformFeedbackPrimitivesWritten),
    (0x0c, ReportCounterType::ZcullStats1),
    (0x0e, ReportCounterType::ZcullStats2),
    (0x0f, ReportCounterType::ClipperInputPrimitives),
    (0x10, ReportCounterType::ZcullStats3),
    (0x11, ReportCounterType::ClipperOutputPrimitives),
    (0x12, ReportCounterType::PrimitivesGenerated),
    (0x13, ReportCounterType::FragmentShaderInvocations),
    (0x15, ReportCounterType::SamplesPassed),
    (0x1a, ReportCounterType::TransformFeedbackOffset),
    (0x1b, ReportCounterType::TessControlShaderInvocations),
    (0x1d, ReportCounterType::TessEvaluationShaderInvocations),
    (0x1f, ReportCounterType::TessEvaluationShaderPrimitives),
];

/// Result of decoding a sparse hardware code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The code has a table entry.
    Mapped(T),
    /// The code has no table entry; the raw field value is kept for logging.
    Unmapped(u32),
}

impl ReportCounterType {
    /// Decode the counter type field (bits 23..28) of a raw semaphore argument.
    pub fn decode(argument: u32) -> Decoded<Self> {
        Self::from_code((argument >> COUNTER_TYPE_SHIFT) & COUNTER_TYPE_MASK)
    }

    /// Look up a 5-bit hardware code.
    pub fn from_code(code: u32) -> Decoded<Self> {
        lookup(REPORT_COUNTER_TABLE, code)
    }

    /// Hardware code of this counter type.
    pub fn code(self) -> u32 {
        reverse_lookup(REPORT_COUNTER_TABLE, self)
    }

    /// How a report of this type is serviced.
    pub fn query(self) -> CounterQuery {
        match self {
            Self::Zero => CounterQuery::Zero,
            Self::SamplesPassed => CounterQuery::Backend(CounterType::SamplesPassed),
            Self::PrimitivesGenerated => CounterQuery::Backend(CounterType::PrimitivesGenerated),
            Self::TransformFeedbackPrimitivesWritten => {
                CounterQuery::Backend(CounterType::TransformFeedbackPrimitivesWritten)
            }
            _ => CounterQuery::Unsupported,
        }
    }
}

/// Counter kinds the host backend can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterType {
    SamplesPassed,
    PrimitivesGenerated,
    TransformFeedbackPrimitivesWritten,
}

impl CounterType {
    /// All backend counter kinds.
    pub const ALL: [CounterType; 3] = [
        CounterType::SamplesPassed,
        CounterType::PrimitivesGenerated,
        CounterType::TransformFeedbackPrimitivesWritten,
    ];
}

/// Dispatch decision for a report counter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterQuery {
    /// Resolved inline with the value 0.
    Zero,
    /// Resolved asynchronously by the backend.
    Backend(CounterType),
    /// Known to the hardware but not emulated; the report is dropped.
    Unsupported,
}

/// Counter selected by a reset-counter method argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetCounterType {
    SamplesPassed,
    ZcullStats,
    TransformFeedbackPrimitivesWritten,
    InputVertices,
    InputPrimitives,
    VertexShaderInvocations,
    TessControlShaderInvocations,
    TessEvaluationShaderInvocations,
    TessEvaluationShaderPrimitives,
    GeometryShaderInvocations,
    GeometryShaderPrimitives,
    ClipperInputPrimitives,
    ClipperOutputPrimitives,
    FragmentShaderInvocations,
    PrimitivesGenerated,
}

/// Hardware code table for [`ResetCounterType`].
const RESET_COUNTER_TABLE: &[(u32, ResetCounterType)] = &[
    (0x01, ResetCounterType::SamplesPassed),
    (0x02, ResetCounterType::ZcullStats),
    (0x10, ResetCounterType::TransformFeedbackPrimitivesWritten),
    (0x12, ResetCounterType::InputVertices),
    (0x13, ResetCounterType::InputPrimitives),
    (0x15, ResetCounterType::VertexShaderInvocations),
    (0x16, ResetCounterType::TessControlShaderInvocations),
    (0x17, ResetCounterType::TessEvaluationShaderInvocations),
    (0x18, ResetCounterType::TessEvaluationShaderPrimitives),
    (0x1a, ResetCounterType::GeometryShaderInvocations),
    (0x1b, ResetCounterType::GeometryShaderPrimitives),
    (0x1c, ResetCounterType::ClipperInputPrimitives),
    (0x1d, ResetCounterType::ClipperOutputPrimitives),
    (0x1e, ResetCounterType::FragmentShaderInvocations),
    (0x1f, ResetCounterType::PrimitivesGenerated),
];

impl ResetCounterType {
    /// Decode a reset-counter method argument.
    pub fn decode(argument: u32) -> Decoded<Self> {
        lookup(RESET_COUNTER_TABLE, argument)
    }

    /// Hardware code of this reset type.
    pub fn code(self) -> u32 {
        reverse_lookup(RESET_COUNTER_TABLE, self)
    }

    /// Backend counter this reset applies to, if the backend tracks it.
    pub fn counter_type(self) -> Option<CounterType> {
        match self {
            Self::SamplesPassed => Some(CounterType::SamplesPassed),
            Self::PrimitivesGenerated => Some(CounterType::PrimitivesGenerated),
            Self::TransformFeedbackPrimitivesWritten => {
                Some(CounterType::TransformFeedbackPrimitivesWritten)
            }
            _ => None,
        }
    }
}

fn lookup<T: Copy>(table: &[(u32, T)], code: u32) -> Decoded<T> {
    table
        .iter()
        .find(|(raw, _)| *raw == code)
        .map_or(Decoded::Unmapped(code), |(_, value)| Decoded::Mapped(*value))
}

fn reverse_lookup<T: Copy + PartialEq>(table: &[(u32, T)], value: T) -> u32 {
    table
        .iter()
        .find(|(_, entry)| *entry == value)
        .map_or(u32::MAX, |(raw, _)| *raw)
}
