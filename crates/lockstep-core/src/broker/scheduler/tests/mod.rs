use super::*;
use crate::broker::config::{BrokerConfig, SchedulerConfig};
use crate::entity::TopicConfig;
use crate::error::{SendError, SettleError};

mod common;
use common::*;

mod receive;
