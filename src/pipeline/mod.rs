pub mod jurisdiction; // Registry + entity detection
pub mod storage; // Chunking, scope tagging, passage index
pub mod rag; // Decompose, retrieve, judge, aggregate
pub mod safety; // Question sanitization + escalation
