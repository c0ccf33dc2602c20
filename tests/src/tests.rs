#![cfg(test)]

mod rig;

mod bus;
mod geometry;
mod image;
mod motion;
mod registers;
mod scenarios;
mod transfer;
