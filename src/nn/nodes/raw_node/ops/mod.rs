/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 网络自带的运算节点。每个节点只实现自身的数学，
 *                 遍历顺序、循环、时间戳等都由网络负责
 */

mod element_times;
mod minus;
mod plus;
mod sigmoid;
mod square_error;
mod sum_elements;
mod tanh;
mod times;

pub(in crate::nn) use element_times::ElementTimes;
pub(in crate::nn) use minus::Minus;
pub(in crate::nn) use plus::Plus;
pub(in crate::nn) use sigmoid::Sigmoid;
pub(in crate::nn) use square_error::SquareError;
pub(in crate::nn) use sum_elements::SumElements;
pub(in crate::nn) use tanh::Tanh;
pub(in crate::nn) use times::Times;
