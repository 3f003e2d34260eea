//! Stable diagnostic codes, partitioned by layer.

use crate::ErrorCode;

// 1xxx: source loader
pub const LOAD_IO: ErrorCode = ErrorCode(1001);
pub const LOAD_NOT_UTF8: ErrorCode = ErrorCode(1002);

// 2xxx: lexer
pub const LEX_UNTERMINATED_STRING: ErrorCode = ErrorCode(2001);
pub const LEX_LONE_BANG: ErrorCode = ErrorCode(2002);
pub const LEX_UNEXPECTED_CHAR: ErrorCode = ErrorCode(2003);
pub const LEX_INT_TOO_LARGE: ErrorCode = ErrorCode(2004);

// 3xxx: parser
pub const PARSE_EXPECTED_TOKEN: ErrorCode = ErrorCode(3001);
pub const PARSE_EXPECTED_STMT: ErrorCode = ErrorCode(3002);
pub const PARSE_EXPECTED_ITEM: ErrorCode = ErrorCode(3003);
pub const PARSE_UNSUPPORTED_JUMP: ErrorCode = ErrorCode(3004);
pub const PARSE_BAD_CTOR: ErrorCode = ErrorCode(3005);
pub const PARSE_TOO_DEEP: ErrorCode = ErrorCode(3006);

// 4xxx: semantic contextualizer
pub const SEMA_UNDECLARED: ErrorCode = ErrorCode(4001);
pub const SEMA_TYPE_MISMATCH: ErrorCode = ErrorCode(4002);
pub const SEMA_NOT_LVALUE: ErrorCode = ErrorCode(4003);
pub const SEMA_REDECLARED: ErrorCode = ErrorCode(4004);
pub const SEMA_UNUSED_LOCAL: ErrorCode = ErrorCode(4005);
pub const SEMA_UNKNOWN_TYPE: ErrorCode = ErrorCode(4006);
pub const SEMA_UNKNOWN_FIELD: ErrorCode = ErrorCode(4007);
pub const SEMA_FIELD_ON_NON_CLASS: ErrorCode = ErrorCode(4008);
pub const SEMA_INT_OUT_OF_RANGE: ErrorCode = ErrorCode(4009);
pub const SEMA_DUPLICATE_CLASS: ErrorCode = ErrorCode(4010);
pub const SEMA_UNKNOWN_FUNCTION: ErrorCode = ErrorCode(4011);
pub const SEMA_ARITY: ErrorCode = ErrorCode(4012);
pub const SEMA_DUPLICATE_FUNCTION: ErrorCode = ErrorCode(4013);
pub const SEMA_DUPLICATE_CTOR: ErrorCode = ErrorCode(4014);
pub const SEMA_VOID_VARIABLE: ErrorCode = ErrorCode(4015);
pub const SEMA_RETURN_VALUE: ErrorCode = ErrorCode(4016);
pub const SEMA_DELETED_MEMBER: ErrorCode = ErrorCode(4017);
pub const SEMA_UNINITIALIZED_READ: ErrorCode = ErrorCode(4018);

// 5xxx: RAII/defer analyzer
pub const RAII_PRECONDITION: ErrorCode = ErrorCode(5000);
pub const RAII_CONDITIONAL_ANCESTOR_DEFER: ErrorCode = ErrorCode(5001);
pub const RAII_DEFER_WITHOUT_LOCAL: ErrorCode = ErrorCode(5002);

// 6xxx: IR emitter
pub const EMIT_NON_LITERAL_BOUND: ErrorCode = ErrorCode(6001);
pub const EMIT_VERIFY: ErrorCode = ErrorCode(6002);
pub const EMIT_UNSUPPORTED: ErrorCode = ErrorCode(6003);
